//! Candidate scan: resolve, pre-filter, cache check, and content
//! deduplication.
//!
//! This is the pipeline's main cost-reduction lever: a popular template
//! file copied across many repositories costs exactly one classifier call
//! regardless of how many URLs reference it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::cache::VerdictCache;
use crate::config::FilterConfig;
use crate::errors::Result;
use crate::frontmatter::has_valid_frontmatter;
use crate::prompt::{prompt_hash, truncate_content};
use crate::source_url::{content_path, parse_github_url};

/// Reason recorded for files failing the structural pre-filter.
pub const FRONTMATTER_REJECT_REASON: &str = "No valid YAML frontmatter";

/// Reason recorded for files that exist but cannot be read.
pub const READ_ERROR_REASON: &str = "Error: file read failed";

/// A verdict resolved without any remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVerdict {
    pub url: String,
    pub is_skill: bool,
    pub reason: String,
}

/// One unique rendered request and every URL that shares it.
///
/// Invariant: all member URLs have byte-identical rendered classification
/// requests, so one verdict fans out to all of them.
#[derive(Debug, Clone)]
pub struct PendingUnit {
    /// SHA-256 of the rendered prompt; cache key and Batches custom_id.
    pub cache_key: String,
    /// Truncated content substituted into the prompt.
    pub content: String,
    /// URLs sharing this exact rendered request, in first-seen order.
    pub urls: Vec<String>,
}

/// Counters gathered while building the plan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlanStats {
    /// URLs that did not parse as GitHub blob URLs (skipped, no verdict).
    pub invalid_url: usize,
    /// URLs whose content is not materialized yet (skipped, no verdict).
    pub no_content: usize,
    /// Files that exist but could not be read (failure verdict).
    pub read_errors: usize,
    /// Structural pre-filter rejections (definitive verdict).
    pub frontmatter_rejected: usize,
    /// Cache hits resolved locally.
    pub cached: usize,
    /// URLs folded into an existing pending unit.
    pub deduplicated: usize,
}

/// Everything resolvable locally plus the units that still need the
/// classifier.
#[derive(Debug, Default)]
pub struct ValidationPlan {
    pub local: Vec<LocalVerdict>,
    pub pending: Vec<PendingUnit>,
    pub stats: PlanStats,
}

/// Enumerate every file under the content root once, so per-URL membership
/// tests need no filesystem access.
pub fn list_content_paths(content_dir: &Path) -> HashSet<PathBuf> {
    walkdir::WalkDir::new(content_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Build the plan for `candidates` (already filtered to unrecorded URLs).
///
/// Order per URL: resolve → content membership → read → pre-filter →
/// truncate → hash → cache lookup → dedupe. The pre-filter runs before any
/// cache access, so structurally invalid files never touch the cache.
pub fn build_plan(
    config: &FilterConfig,
    cache: &dyn VerdictCache,
    candidates: &[String],
) -> Result<ValidationPlan> {
    let content_paths = list_content_paths(&config.content_dir);
    let mut plan = ValidationPlan::default();
    let mut unit_index: HashMap<String, usize> = HashMap::new();

    for url in candidates {
        let Some(parsed) = parse_github_url(url) else {
            plan.stats.invalid_url += 1;
            continue;
        };
        let path = content_path(&config.content_dir, &parsed);
        if !content_paths.contains(&path) {
            plan.stats.no_content += 1;
            continue;
        }

        let content = match read_lossy(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(url = %url, error = %err, "content read failed");
                plan.stats.read_errors += 1;
                plan.local.push(LocalVerdict {
                    url: url.clone(),
                    is_skill: false,
                    reason: READ_ERROR_REASON.to_string(),
                });
                continue;
            }
        };

        if !has_valid_frontmatter(&content) {
            plan.stats.frontmatter_rejected += 1;
            plan.local.push(LocalVerdict {
                url: url.clone(),
                is_skill: false,
                reason: FRONTMATTER_REJECT_REASON.to_string(),
            });
            continue;
        }

        let truncated = truncate_content(&content);
        let cache_key = prompt_hash(&truncated);

        match cache.get(&cache_key) {
            Ok(Some(hit)) => {
                plan.stats.cached += 1;
                plan.local.push(LocalVerdict {
                    url: url.clone(),
                    is_skill: hit.is_skill,
                    reason: hit.reason,
                });
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                // A corrupt entry must not abort the run; fall through to a
                // fresh classification which will overwrite it.
                tracing::warn!(key = %cache_key, error = %err, "cache read failed");
            }
        }

        match unit_index.get(&cache_key) {
            Some(&index) => {
                plan.stats.deduplicated += 1;
                plan.pending[index].urls.push(url.clone());
            }
            None => {
                unit_index.insert(cache_key.clone(), plan.pending.len());
                plan.pending.push(PendingUnit {
                    cache_key,
                    content: truncated,
                    urls: vec![url.clone()],
                });
            }
        }
    }

    Ok(plan)
}

/// Read file content, replacing invalid UTF-8 (the corpus is not trusted to
/// be clean).
fn read_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
