use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::types::IngestIssue;

fn is_log_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|value| value.to_str()),
        Some("jsonl")
    )
}

/// Walks every existing root for `*.jsonl` files. Missing roots are ignored.
///
/// Paths are deduplicated and sorted; walk errors become issues.
pub fn discover_log_files(roots: &[PathBuf]) -> (Vec<PathBuf>, Vec<IngestIssue>) {
    let mut files = Vec::new();
    let mut issues = Vec::new();
    for root in roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "log root missing");
            continue;
        }
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let file_path = err
                        .path()
                        .map(|path| path.to_string_lossy().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    issues.push(IngestIssue {
                        file_path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            if entry.file_type().is_file() && is_log_path(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    (files, issues)
}
