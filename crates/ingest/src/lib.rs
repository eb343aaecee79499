mod changes;
mod dedup;
mod limits;
mod parser;
mod paths;
mod pipeline;
mod projects;
mod scan;
mod snapshot;
mod types;

pub use changes::{classify_change, detect_changes};
pub use dedup::{limit_identity, message_identity};
pub use limits::{PartialLimitEvent, classify_limit_type, extract_reset_text, parse_reset_time};
pub use parser::{
    FileRecords, LIMIT_TIMESTAMP_WINDOW, ParsedRecord, SourceContext, parse_line, parse_line_in,
    parse_reader, parse_reader_in, parse_value_in,
};
pub use paths::{default_data_dir, default_log_roots};
pub use pipeline::{
    CostEstimator, IngestRequest, TIMING_ENV, ingest, ingest_in, rebuild, rebuild_in, run,
};
pub use projects::{MAX_DESCRIPTION_CHARS, MAX_NAME_CHARS, ProjectStore, ProjectUpdate};
pub use scan::discover_log_files;
pub use snapshot::{parse_snapshot, parse_used_percent, parse_week_reset};
pub use types::{IngestError, IngestIssue, IngestStats, ProjectStoreError, Result, SnapshotError};
