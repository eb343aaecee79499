use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use tracing::debug;
use usage_core::{ChangeKind, FileStatus, FileTrack};

pub fn classify_change(tracked: Option<&FileTrack>, mtime_ns: i64, size_bytes: i64) -> ChangeKind {
    match tracked {
        None => ChangeKind::New,
        Some(track) if track.mtime_ns != mtime_ns || track.size_bytes != size_bytes => {
            ChangeKind::Modified
        }
        Some(_) => ChangeKind::Unchanged,
    }
}

pub(crate) fn mtime_ns(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Stats each path and compares it with its tracking row.
///
/// Paths that cannot be stat'ed (removed since discovery) are left out.
pub fn detect_changes(paths: &[PathBuf], tracked: &HashMap<String, FileTrack>) -> Vec<FileStatus> {
    let mut statuses = Vec::with_capacity(paths.len());
    for path in paths {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(file = %path.display(), error = %err, "file vanished before stat");
                continue;
            }
        };
        let mtime_ns = mtime_ns(&metadata);
        let size_bytes = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
        let key = path.to_string_lossy();
        statuses.push(FileStatus {
            path: path.clone(),
            kind: classify_change(tracked.get(key.as_ref()), mtime_ns, size_bytes),
            mtime_ns,
            size_bytes,
        });
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(path: &str, mtime_ns: i64, size_bytes: i64) -> FileTrack {
        FileTrack {
            path: path.to_string(),
            mtime_ns,
            size_bytes,
            last_scanned: "2025-06-01T00:00:00Z".to_string(),
            entry_count: 0,
        }
    }

    #[test]
    fn classifies_new_modified_unchanged() {
        let tracked = track("/a.jsonl", 100, 50);
        assert_eq!(classify_change(None, 100, 50), ChangeKind::New);
        assert_eq!(classify_change(Some(&tracked), 100, 51), ChangeKind::Modified);
        assert_eq!(classify_change(Some(&tracked), 101, 50), ChangeKind::Modified);
        assert_eq!(classify_change(Some(&tracked), 100, 50), ChangeKind::Unchanged);
    }

    #[test]
    fn vanished_files_are_excluded() {
        let dir = tempfile::tempdir().expect("temp dir");
        let present = dir.path().join("present.jsonl");
        fs::write(&present, "{}\n").expect("write");
        let gone = dir.path().join("gone.jsonl");

        let statuses = detect_changes(&[present.clone(), gone], &HashMap::new());
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].path, present);
        assert_eq!(statuses[0].kind, ChangeKind::New);
        assert_eq!(statuses[0].size_bytes, 3);
    }

    #[test]
    fn tracked_file_with_same_metadata_is_unchanged() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("a.jsonl");
        fs::write(&path, "{}\n").expect("write");
        let first = detect_changes(std::slice::from_ref(&path), &HashMap::new());
        let key = path.to_string_lossy().to_string();
        let mut tracked = HashMap::new();
        tracked.insert(key.clone(), track(&key, first[0].mtime_ns, first[0].size_bytes));

        let second = detect_changes(std::slice::from_ref(&path), &tracked);
        assert_eq!(second[0].kind, ChangeKind::Unchanged);
    }
}
