/// Rows actually written by one per-file commit (duplicates excluded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCommit {
    pub entries_inserted: usize,
    pub limit_events_inserted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupRecompute {
    pub hours: usize,
    pub years: usize,
}

/// Buckets whose stored aggregate differs from a fresh derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupDrift {
    pub hourly: Vec<String>,
    pub models: Vec<String>,
}

impl RollupDrift {
    pub fn is_clean(&self) -> bool {
        self.hourly.is_empty() && self.models.is_empty()
    }
}
