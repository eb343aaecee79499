use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use ingest::CostEstimator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use usage_core::{ModelPricing, TokenUsage, compute_cost_usd};

use crate::error::{AppError, Result};

/// Model name to per-token prices.
pub type PriceTable = BTreeMap<String, ModelPricing>;

const PROVIDER_PREFIXES: &[&str] = &[
    "anthropic/",
    "bedrock/",
    "vertex_ai/",
    "claude-3-5-",
    "claude-3-",
    "claude-",
    "openrouter/openai/",
];

const MODEL_ALIASES: &[(&str, &str)] = &[
    ("claude-3-opus", "claude-3-opus-20240229"),
    ("claude-3-sonnet", "claude-3-sonnet-20240229"),
    ("claude-3-haiku", "claude-3-haiku-20240307"),
    ("claude-3.5-sonnet", "claude-3-5-sonnet-20241022"),
    ("claude-3.5-haiku", "claude-3-5-haiku-20241022"),
    ("claude-opus-4", "claude-opus-4-20250514"),
    ("claude-sonnet-4", "claude-sonnet-4-20250514"),
];

/// Where fresh prices come from. Implementations own any network access.
pub trait PriceSource: Send + Sync {
    fn fetch(&self) -> Result<PriceTable>;
}

/// A LiteLLM-format price document on disk.
#[derive(Debug, Clone)]
pub struct FilePriceSource {
    path: PathBuf,
}

impl FilePriceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PriceSource for FilePriceSource {
    fn fetch(&self) -> Result<PriceTable> {
        let file = fs::File::open(&self.path)?;
        let value: Value = serde_json::from_reader(BufReader::new(file))?;
        parse_litellm_prices(&value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource(pub PriceTable);

impl PriceSource for StaticPriceSource {
    fn fetch(&self) -> Result<PriceTable> {
        Ok(self.0.clone())
    }
}

fn price(record: &Value, key: &str) -> Option<f64> {
    record.get(key).and_then(Value::as_f64)
}

/// Converts a LiteLLM `model_prices_and_context_window.json` document.
/// Entries without any per-token price are ignored.
pub fn parse_litellm_prices(document: &Value) -> Result<PriceTable> {
    let map = document
        .as_object()
        .ok_or_else(|| AppError::InvalidInput("price document must be an object".to_string()))?;
    let mut table = PriceTable::new();
    for (model, record) in map {
        let input = price(record, "input_cost_per_token");
        let output = price(record, "output_cost_per_token");
        if input.is_none() && output.is_none() {
            continue;
        }
        table.insert(
            model.clone(),
            ModelPricing {
                input_per_token: input.unwrap_or(0.0),
                input_per_token_above_200k: price(record, "input_cost_per_token_above_200k_tokens"),
                output_per_token: output.unwrap_or(0.0),
                output_per_token_above_200k: price(
                    record,
                    "output_cost_per_token_above_200k_tokens",
                ),
                cache_write_per_token: price(record, "cache_creation_input_token_cost")
                    .unwrap_or(0.0),
                cache_write_per_token_above_200k: price(
                    record,
                    "cache_creation_input_token_cost_above_200k_tokens",
                ),
                cache_read_per_token: price(record, "cache_read_input_token_cost").unwrap_or(0.0),
                cache_read_per_token_above_200k: price(
                    record,
                    "cache_read_input_token_cost_above_200k_tokens",
                ),
            },
        );
    }
    Ok(table)
}

/// Exact names to try for `model`, most specific first.
pub fn model_candidates(model: &str) -> Vec<String> {
    let alias = MODEL_ALIASES
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, target)| *target);
    let mut candidates = vec![model.to_string()];
    candidates.extend(alias.map(str::to_string));
    for prefix in PROVIDER_PREFIXES {
        candidates.push(format!("{prefix}{model}"));
        if let Some(alias) = alias {
            candidates.push(format!("{prefix}{alias}"));
        }
    }
    candidates.dedup();
    candidates
}

fn find_in_table(table: &PriceTable, model: &str) -> Option<ModelPricing> {
    for candidate in model_candidates(model) {
        if let Some(pricing) = table.get(&candidate) {
            return Some(*pricing);
        }
    }
    let wanted = model.to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    // Shortest key containing the model, else the longest key the model contains.
    let containing = table
        .iter()
        .filter(|(key, _)| key.to_lowercase().contains(&wanted))
        .min_by_key(|(key, _)| key.len());
    let contained = || {
        table
            .iter()
            .filter(|(key, _)| !key.is_empty() && wanted.contains(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
    };
    containing.or_else(contained).map(|(_, pricing)| *pricing)
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskCache {
    fetched_at: String,
    models: PriceTable,
}

#[derive(Default)]
struct CacheState {
    table: Option<PriceTable>,
    refreshed: bool,
}

/// Memory, then disk, then source. A miss triggers one refresh per cache
/// lifetime; when the source fails the stale table keeps being served.
#[derive(Clone)]
pub struct PricingCache {
    disk_path: Option<PathBuf>,
    source: Option<Arc<dyn PriceSource>>,
    state: Arc<Mutex<CacheState>>,
}

impl PricingCache {
    pub fn new(disk_path: Option<PathBuf>, source: Option<Arc<dyn PriceSource>>) -> Self {
        Self {
            disk_path,
            source,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        let mut state = self.lock();
        if state.table.is_none() {
            state.table = self.load_disk();
        }
        if state.table.is_none() {
            self.refresh_locked(&mut state);
        }
        if let Some(found) = state.table.as_ref().and_then(|table| find_in_table(table, model)) {
            return Some(found);
        }
        if state.refreshed {
            return None;
        }
        debug!(model, "price miss; refreshing");
        self.refresh_locked(&mut state);
        state.table.as_ref().and_then(|table| find_in_table(table, model))
    }

    /// Forces a fetch from the source. Returns whether fresh prices were loaded.
    pub fn refresh(&self) -> bool {
        let mut state = self.lock();
        self.refresh_locked(&mut state)
    }

    pub fn cost_for(&self, model: &str, usage: &TokenUsage) -> Option<f64> {
        self.lookup(model)
            .map(|pricing| compute_cost_usd(*usage, &pricing))
    }

    fn refresh_locked(&self, state: &mut CacheState) -> bool {
        state.refreshed = true;
        let Some(source) = &self.source else {
            return false;
        };
        match source.fetch() {
            Ok(table) => {
                if let Some(path) = &self.disk_path
                    && let Err(err) = save_disk(path, &table)
                {
                    warn!(path = %path.display(), error = %err, "failed to write pricing cache");
                }
                state.table = Some(table);
                true
            }
            Err(err) => {
                warn!(error = %err, stale = state.table.is_some(), "price refresh failed");
                false
            }
        }
    }

    fn load_disk(&self) -> Option<PriceTable> {
        let path = self.disk_path.as_ref()?;
        match load_disk(path) {
            Ok(table) => Some(table),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "pricing cache unavailable");
                None
            }
        }
    }
}

impl CostEstimator for PricingCache {
    fn estimate_cost(&self, model: &str, usage: &TokenUsage) -> Option<f64> {
        self.cost_for(model, usage)
    }
}

fn load_disk(path: &Path) -> Result<PriceTable> {
    let file = fs::File::open(path)?;
    let cache: DiskCache = serde_json::from_reader(BufReader::new(file))?;
    Ok(cache.models)
}

fn save_disk(path: &Path, table: &PriceTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    let cache = DiskCache {
        fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        models: table.clone(),
    };
    serde_json::to_writer_pretty(writer, &cache).map_err(AppError::from)
}
