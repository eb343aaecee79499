use std::path::PathBuf;

fn home_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home);
    }
    if let Ok(profile) = std::env::var("USERPROFILE") {
        return PathBuf::from(profile);
    }
    PathBuf::from(".")
}

/// Project-log roots to scan.
///
/// `CLAUDE_CONFIG_DIR` (comma separated) replaces the defaults
/// `~/.claude/projects` and `~/.config/claude/projects`; each entry gets
/// `projects` appended.
pub fn default_log_roots() -> Vec<PathBuf> {
    if let Ok(raw) = std::env::var("CLAUDE_CONFIG_DIR") {
        let roots = roots_from_config_dirs(&raw);
        if !roots.is_empty() {
            return roots;
        }
    }
    let home = home_dir();
    vec![
        home.join(".claude").join("projects"),
        home.join(".config").join("claude").join("projects"),
    ]
}

pub(crate) fn roots_from_config_dirs(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| PathBuf::from(value).join("projects"))
        .collect()
}

pub fn default_data_dir() -> PathBuf {
    home_dir().join(".claude").join("db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dirs_are_split_and_suffixed() {
        let roots = roots_from_config_dirs("/a, /b/c ,,");
        assert_eq!(
            roots,
            vec![PathBuf::from("/a/projects"), PathBuf::from("/b/c/projects")]
        );
    }
}
