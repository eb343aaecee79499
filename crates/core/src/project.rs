use std::path::{Component, Path, PathBuf};

pub const UNKNOWN_PROJECT: &str = "unknown";

const SEPARATOR_MARKER: char = '-';

/// Derives the project id for a log file.
///
/// The id is the first directory below whichever root contains `file`
/// (`<root>/<project_id>/<...>/<session>.jsonl`). Files outside every root,
/// or sitting directly in a root, classify as [`UNKNOWN_PROJECT`].
pub fn project_id_from_path(file: &Path, roots: &[PathBuf]) -> String {
    for root in roots {
        let Ok(relative) = file.strip_prefix(root) else {
            continue;
        };
        let mut components = relative.components().filter_map(|component| match component {
            Component::Normal(value) => value.to_str(),
            _ => None,
        });
        let first = components.next();
        let has_more = components.next().is_some();
        if let Some(id) = first
            && has_more
            && !id.is_empty()
        {
            return id.to_string();
        }
    }
    UNKNOWN_PROJECT.to_string()
}

pub fn encode_project_path(path: &str) -> String {
    path.replace(['/', '\\'], &SEPARATOR_MARKER.to_string())
}

/// Reverses [`encode_project_path`].
///
/// Lossy: a literal `-` inside a directory name decodes as a separator, so
/// `-home-me-my-app` becomes `/home/me/my/app`. Ids without the leading marker
/// (including `unknown`) have no absolute path.
pub fn decode_project_id(project_id: &str) -> Option<String> {
    let rest = project_id.strip_prefix(SEPARATOR_MARKER)?;
    if rest.is_empty() {
        return None;
    }
    Some(format!("/{}", rest.replace(SEPARATOR_MARKER, "/")))
}
