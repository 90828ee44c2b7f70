//! Error types for the classification pipeline.

use thiserror::Error;

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Errors raised while building or executing a filter run.
#[derive(Debug, Error)]
pub enum FilterError {
    /// SQLite error from the verdict store or the upstream source.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// Filesystem error (content tree, cache directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error outside of classifier-response parsing.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP request itself failed (connect, timeout, body).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The classifier API returned a non-success response.
    #[error("HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API, or the raw body when unparseable.
        message: String,
        /// Error type reported by the API, if any.
        error_type: Option<String>,
    },

    /// The classifier's reply could not be interpreted after all fallbacks.
    #[error("parse error: {0}")]
    Parse(String),

    /// A cache entry could not be read or written.
    #[error("cache error: {0}")]
    Cache(String),

    /// Missing or invalid run configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FilterError {
    /// Reason string recorded on a verdict when this error exhausted its
    /// retry budget. The prefixes are recognized by
    /// [`crate::store::ValidationDb::definitive_urls`], so failed units are
    /// re-attempted on the next run instead of being skipped.
    pub fn verdict_reason(&self) -> String {
        match self {
            Self::Parse(msg) => format!("Parse error: {}", truncate_chars(msg, 50)),
            other => format!("API error: {other}"),
        }
    }
}

/// Cap a reason string at `max` characters (verdict rows keep a short
/// diagnostic, not the whole response body).
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
