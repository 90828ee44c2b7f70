//! skillscan-core: the SKILL.md classification pipeline.
//!
//! Turns the collector's URL corpus into a durable, resumable set of
//! classification verdicts while spending as few remote classifier calls
//! as possible: structural pre-filtering, content deduplication, a global
//! verdict cache, and bounded-concurrency (or batched) submission.

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod frontmatter;
pub mod pack;
pub mod pipeline;
pub mod plan;
pub mod prompt;
pub mod source_url;
pub mod store;

pub use cache::{CachedVerdict, FsVerdictCache, VerdictCache};
pub use client::{ClassifierClient, ClassifierVerdict, parse_verdict};
pub use config::{DEFAULT_MODEL, FilterConfig, Strategy};
pub use errors::{FilterError, Result};
pub use pipeline::{RunSummary, run_filter, run_filter_with};
pub use plan::{PendingUnit, ValidationPlan, build_plan};
pub use source_url::{ParsedSourceUrl, content_path, parse_github_url};
pub use store::{SourceDb, ValidationDb};
