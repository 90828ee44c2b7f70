//! Run configuration and pipeline constants.

use std::path::PathBuf;
use std::time::Duration;

/// Default classifier model.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// Default API base; override to point at a locally hosted compatible
/// endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// Truncate content for classification; frontmatter + intro is enough.
pub const CONTENT_MAX_BYTES: usize = 3000;

/// Max requests per Batches API submission.
pub const BATCH_CHUNK_SIZE: usize = 10_000;

/// Estimated-token budget per submitted batch.
pub const BATCH_TOKEN_BUDGET: usize = 2_000_000;

/// Rough bytes-per-token factor used for the packer's size estimate.
pub const BYTES_PER_TOKEN: usize = 4;

/// Max output tokens requested from the classifier.
pub const MAX_OUTPUT_TOKENS: u32 = 256;

/// How classifier calls are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One request per unique content unit, bounded concurrency.
    #[default]
    Concurrent,
    /// Message Batches submit/poll convention (cheaper, slower).
    Batches,
}

/// Configuration for one filter run.
///
/// Constructed by the caller with explicit, typed fields; the pipeline has
/// no hidden global state.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Upstream metadata database from the collector (read-only).
    pub main_db: PathBuf,
    /// Output database holding validation results and the derived files
    /// table.
    pub output_db: PathBuf,
    /// Root of the materialized content tree.
    pub content_dir: PathBuf,
    /// Directory of cached classifier verdicts, one JSON file per prompt
    /// hash.
    pub cache_dir: PathBuf,
    /// Classifier model identifier.
    pub model: String,
    /// Maximum concurrent classifier calls (concurrent strategy).
    pub max_concurrent: usize,
    /// API base URL.
    pub api_base: String,
    /// API credential; falls back to the `ANTHROPIC_API_KEY` environment
    /// variable when unset.
    pub api_key: Option<String>,
    /// Calling convention.
    pub strategy: Strategy,
    /// Delay before the first retry; doubles per attempt.
    pub retry_initial_delay: Duration,
    /// Interval between batch status polls.
    pub poll_interval: Duration,
}

impl FilterConfig {
    /// Config with default tuning for the given paths.
    pub fn new(
        main_db: impl Into<PathBuf>,
        output_db: impl Into<PathBuf>,
        content_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            main_db: main_db.into(),
            output_db: output_db.into(),
            content_dir: content_dir.into(),
            cache_dir: cache_dir.into(),
            model: DEFAULT_MODEL.to_string(),
            max_concurrent: 3,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            strategy: Strategy::default(),
            retry_initial_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(30),
        }
    }
}
