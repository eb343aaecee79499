use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub mod project;
pub mod time;

pub use project::{UNKNOWN_PROJECT, decode_project_id, encode_project_path, project_id_from_path};
pub use time::{HourBucket, date_key, normalize_to_local, normalize_to_zone, parse_utc_timestamp};

/// Token counters of one assistant turn. Missing counters are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl TokenUsage {
    /// Sum of the four counters, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_write_tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub identity_key: String,
    pub utc_timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<FixedOffset>,
    pub local_year: i32,
    pub local_date: String,
    pub local_hour: u32,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub message_id: Option<String>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub usage: TokenUsage,
    pub source_file: String,
    pub project_id: String,
}

impl MessageEntry {
    pub fn total_tokens(&self) -> u64 {
        self.usage.total()
    }

    pub fn bucket(&self) -> HourBucket {
        HourBucket::from_local(&self.local_timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitType {
    #[serde(rename = "5-hour")]
    FiveHour,
    #[serde(rename = "session")]
    Session,
    #[serde(rename = "spending_cap")]
    SpendingCap,
    #[serde(rename = "context")]
    Context,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::FiveHour => "5-hour",
            LimitType::Session => "session",
            LimitType::SpendingCap => "spending_cap",
            LimitType::Context => "context",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "5-hour" => Some(LimitType::FiveHour),
            "session" => Some(LimitType::Session),
            "spending_cap" => Some(LimitType::SpendingCap),
            "context" => Some(LimitType::Context),
            _ => None,
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed rate-limit occurrence. Only ever built with a resolved timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitEvent {
    pub identity_key: String,
    pub limit_type: LimitType,
    pub occurred_at: DateTime<Utc>,
    pub occurred_at_local: DateTime<FixedOffset>,
    pub local_year: i32,
    pub local_date: String,
    pub local_hour: u32,
    pub reset_at_local: DateTime<FixedOffset>,
    pub reset_text: Option<String>,
    pub session_id: Option<String>,
    pub summary_text: Option<String>,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTrack {
    pub path: String,
    pub mtime_ns: i64,
    pub size_bytes: i64,
    pub last_scanned: String,
    /// Entries parsed from the file on its last scan, including ones already
    /// stored from another file or an earlier scan. Not the number inserted.
    pub entry_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub mtime_ns: i64,
    pub size_bytes: i64,
}

impl FileStatus {
    pub fn needs_processing(&self) -> bool {
        self.kind != ChangeKind::Unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub date: String,
    pub message_count: u64,
    pub session_count: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAggregate {
    pub model: String,
    pub year: i32,
    pub message_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub description: String,
    pub absolute_path: Option<String>,
    pub first_seen: String,
    pub last_seen: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectListing {
    pub project_id: String,
    #[serde(flatten)]
    pub metadata: ProjectMetadata,
}

/// Inclusive range of local dates (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub messages: u64,
    pub sessions: u64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_cost: f64,
    pub first_session: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: String,
    pub messages: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineGranularity {
    Day,
    Week,
    Month,
}

impl TimelineGranularity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Some(TimelineGranularity::Day),
            "week" | "weekly" => Some(TimelineGranularity::Week),
            "month" | "monthly" => Some(TimelineGranularity::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub period: String,
    pub messages: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub messages: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyProfilePoint {
    pub hour: u32,
    pub messages: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub project_id: String,
    pub model: Option<String>,
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub messages: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub local_timestamp: String,
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDetails {
    pub date: String,
    pub totals: UsageTotals,
    pub hourly: Vec<HourlyProfilePoint>,
    pub models: Vec<ModelUsage>,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub model: String,
    pub totals: UsageTotals,
    pub daily: Vec<DailyActivity>,
    pub top_sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetails {
    pub summary: SessionSummary,
    pub totals: UsageTotals,
    pub messages: Vec<SessionMessage>,
}

/// One scraper run: plan usage percentages as shown in the account UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub email: String,
    pub logfile: Option<String>,
    pub session_used_pct: Option<f64>,
    pub session_resets: Option<String>,
    pub week_used_pct: Option<f64>,
    pub week_resets: Option<String>,
    pub week_reset_at: Option<String>,
    pub captured_at: String,
}

/// Per-token prices for one model. `*_above_200k` apply past the tier threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_token: f64,
    pub input_per_token_above_200k: Option<f64>,
    pub output_per_token: f64,
    pub output_per_token_above_200k: Option<f64>,
    pub cache_write_per_token: f64,
    pub cache_write_per_token_above_200k: Option<f64>,
    pub cache_read_per_token: f64,
    pub cache_read_per_token_above_200k: Option<f64>,
}

pub const TIERED_THRESHOLD_TOKENS: u64 = 200_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub cache_write_cost_usd: f64,
    pub cache_read_cost_usd: f64,
    pub total_cost_usd: f64,
}

fn tiered_cost(tokens: u64, base: f64, above: Option<f64>) -> f64 {
    if tokens == 0 {
        return 0.0;
    }
    match above {
        Some(above) if tokens > TIERED_THRESHOLD_TOKENS => {
            let below = TIERED_THRESHOLD_TOKENS as f64 * base.max(0.0);
            below + (tokens - TIERED_THRESHOLD_TOKENS) as f64 * above
        }
        _ => tokens as f64 * base.max(0.0),
    }
}

pub fn compute_cost_breakdown(usage: TokenUsage, pricing: &ModelPricing) -> CostBreakdown {
    // Each counter is tiered on its own, not on the turn total.
    let input = tiered_cost(
        usage.input_tokens,
        pricing.input_per_token,
        pricing.input_per_token_above_200k,
    );
    let output = tiered_cost(
        usage.output_tokens,
        pricing.output_per_token,
        pricing.output_per_token_above_200k,
    );
    let cache_write = tiered_cost(
        usage.cache_write_tokens,
        pricing.cache_write_per_token,
        pricing.cache_write_per_token_above_200k,
    );
    let cache_read = tiered_cost(
        usage.cache_read_tokens,
        pricing.cache_read_per_token,
        pricing.cache_read_per_token_above_200k,
    );
    CostBreakdown {
        input_cost_usd: input,
        output_cost_usd: output,
        cache_write_cost_usd: cache_write,
        cache_read_cost_usd: cache_read,
        total_cost_usd: input + output + cache_write + cache_read,
    }
}

pub fn compute_cost_usd(usage: TokenUsage, pricing: &ModelPricing) -> f64 {
    compute_cost_breakdown(usage, pricing).total_cost_usd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_total_saturates_instead_of_overflowing() {
        let usage = TokenUsage {
            input_tokens: u64::MAX,
            output_tokens: 1,
            ..TokenUsage::default()
        };
        assert_eq!(usage.total(), u64::MAX);
    }

    fn pricing() -> ModelPricing {
        ModelPricing {
            input_per_token: 3e-6,
            input_per_token_above_200k: Some(6e-6),
            output_per_token: 15e-6,
            output_per_token_above_200k: None,
            cache_write_per_token: 3.75e-6,
            cache_write_per_token_above_200k: None,
            cache_read_per_token: 0.3e-6,
            cache_read_per_token_above_200k: None,
        }
    }

    #[test]
    fn total_tokens_is_sum_of_counters() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 20,
            cache_read_tokens: 30,
            cache_write_tokens: 40,
        };
        assert_eq!(usage.total(), 100);
    }

    #[test]
    fn cost_below_threshold_is_linear() {
        let usage = TokenUsage {
            input_tokens: 1_000,
            output_tokens: 2_000,
            cache_read_tokens: 10_000,
            cache_write_tokens: 500,
        };
        let cost = compute_cost_breakdown(usage, &pricing());
        assert!((cost.input_cost_usd - 0.003).abs() < 1e-12);
        assert!((cost.output_cost_usd - 0.03).abs() < 1e-12);
        assert!((cost.cache_read_cost_usd - 0.003).abs() < 1e-12);
        assert!((cost.cache_write_cost_usd - 0.001875).abs() < 1e-12);
        assert!((cost.total_cost_usd - 0.037875).abs() < 1e-12);
    }

    #[test]
    fn cost_above_threshold_uses_tier_price_for_excess() {
        let usage = TokenUsage {
            input_tokens: 250_000,
            ..TokenUsage::default()
        };
        let cost = compute_cost_usd(usage, &pricing());
        let expected = 200_000.0 * 3e-6 + 50_000.0 * 6e-6;
        assert!((cost - expected).abs() < 1e-9);
    }

    #[test]
    fn cost_above_threshold_without_tier_stays_linear() {
        let usage = TokenUsage {
            output_tokens: 300_000,
            ..TokenUsage::default()
        };
        let cost = compute_cost_usd(usage, &pricing());
        assert!((cost - 300_000.0 * 15e-6).abs() < 1e-9);
    }

    #[test]
    fn limit_type_labels_roundtrip() {
        for limit in [
            LimitType::FiveHour,
            LimitType::Session,
            LimitType::SpendingCap,
            LimitType::Context,
        ] {
            assert_eq!(LimitType::parse(limit.as_str()), Some(limit));
        }
        assert_eq!(LimitType::parse("weekly"), None);
    }

    #[test]
    fn project_metadata_backfills_visible() {
        let raw = r#"{"name":"app","description":"","absolute_path":null,"first_seen":"2025-01-01T00:00:00Z","last_seen":"2025-01-02T00:00:00Z"}"#;
        let parsed: ProjectMetadata = serde_json::from_str(raw).expect("metadata");
        assert!(parsed.visible);
    }
}
