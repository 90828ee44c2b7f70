//! Pipeline orchestration: plan, classify, persist, rebuild.
//!
//! No error for a single unit aborts the run: every candidate ends up with
//! exactly one verdict, or is excluded from the candidate set for a
//! distinguishable reason (unparseable URL, content not materialized).

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::cache::{CachedVerdict, FsVerdictCache, VerdictCache};
use crate::client::{ClassifierClient, ClassifierVerdict};
use crate::config::{BATCH_CHUNK_SIZE, BATCH_TOKEN_BUDGET, FilterConfig, Strategy};
use crate::errors::Result;
use crate::pack::pack;
use crate::plan::{PendingUnit, ValidationPlan, build_plan};
use crate::store::{SourceDb, ValidationDb};

/// Log cadence for classified units.
const PROGRESS_EVERY: usize = 100;

/// Aggregate counts reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// URLs known upstream.
    pub total: usize,
    /// URLs skipped because a definitive verdict already exists.
    pub already_recorded: usize,
    /// URLs without a materialized content file.
    pub no_content: usize,
    /// URLs that did not parse as GitHub blob URLs.
    pub invalid_url: usize,
    /// Files that exist but could not be read.
    pub read_errors: usize,
    /// Structural pre-filter rejections.
    pub frontmatter_rejected: usize,
    /// Verdicts resolved from the cache.
    pub cached: usize,
    /// URLs folded into an already-pending unit.
    pub deduplicated: usize,
    /// Unique units sent to the classifier.
    pub submitted_units: usize,
    /// URLs recorded valid by the classifier this run.
    pub valid: usize,
    /// URLs recorded invalid by the classifier this run.
    pub invalid: usize,
    /// URLs recorded with a failure verdict this run.
    pub errors: usize,
    /// Rows in the rebuilt derived files table.
    pub files_rebuilt: usize,
}

/// Run the filter pipeline with collaborators built from `config`.
pub async fn run_filter(config: &FilterConfig) -> Result<RunSummary> {
    let client = ClassifierClient::new(config)?;
    let cache = FsVerdictCache::open(&config.cache_dir)?;
    run_filter_with(config, &client, &cache).await
}

/// Run the filter pipeline with injected collaborators.
///
/// This is the seam the tests use: any [`VerdictCache`] backing, any
/// compatible endpoint behind the client.
pub async fn run_filter_with(
    config: &FilterConfig,
    client: &ClassifierClient,
    cache: &dyn VerdictCache,
) -> Result<RunSummary> {
    let db = ValidationDb::open(&config.output_db)?;

    let all_urls = SourceDb::open(&config.main_db)?.all_file_urls()?;
    let recorded = db.definitive_urls()?;
    let candidates: Vec<String> = all_urls
        .iter()
        .filter(|url| !recorded.contains(url.as_str()))
        .cloned()
        .collect();

    tracing::info!(
        total = all_urls.len(),
        already_recorded = recorded.len(),
        to_validate = candidates.len(),
        "starting filter run"
    );

    let plan = build_plan(config, cache, &candidates)?;
    let mut summary = summary_from_plan(&plan);
    summary.total = all_urls.len();
    summary.already_recorded = recorded.len();

    tracing::info!(
        frontmatter_rejected = plan.stats.frontmatter_rejected,
        cached = plan.stats.cached,
        unique_to_submit = plan.pending.len(),
        deduplicated = plan.stats.deduplicated,
        "plan built"
    );

    // Locally resolved verdicts go in before any remote work, so an
    // interrupted run keeps them.
    for verdict in &plan.local {
        db.upsert(&verdict.url, verdict.is_skill, &verdict.reason)?;
    }

    if plan.pending.is_empty() {
        summary.files_rebuilt = db.rebuild_files(&config.main_db)?;
        return Ok(summary);
    }

    // The concurrent pool serializes verdict writes through one handle.
    let db = Arc::new(Mutex::new(db));
    match config.strategy {
        Strategy::Concurrent => {
            classify_concurrent(config, client, cache, &db, plan.pending, &mut summary).await?;
        }
        Strategy::Batches => {
            classify_batches(config, client, cache, &db, plan.pending, &mut summary).await?;
        }
    }

    let db = db.lock().await;
    summary.files_rebuilt = db.rebuild_files(&config.main_db)?;
    tracing::info!(
        valid = summary.valid,
        invalid = summary.invalid,
        errors = summary.errors,
        files_rebuilt = summary.files_rebuilt,
        "filter run finished"
    );
    Ok(summary)
}

fn summary_from_plan(plan: &ValidationPlan) -> RunSummary {
    RunSummary {
        no_content: plan.stats.no_content,
        invalid_url: plan.stats.invalid_url,
        read_errors: plan.stats.read_errors,
        frontmatter_rejected: plan.stats.frontmatter_rejected,
        cached: plan.stats.cached,
        deduplicated: plan.stats.deduplicated,
        submitted_units: plan.pending.len(),
        ..RunSummary::default()
    }
}

/// Record one unit's outcome: successes are cached once, then fanned out
/// to every member URL; failures are recorded for every member URL but
/// never cached, so the next run retries them.
async fn record_outcome(
    cache: &dyn VerdictCache,
    db: &Arc<Mutex<ValidationDb>>,
    unit: &PendingUnit,
    outcome: std::result::Result<ClassifierVerdict, String>,
    summary: &mut RunSummary,
) -> Result<()> {
    match outcome {
        Ok(verdict) => {
            let entry = CachedVerdict {
                is_skill: verdict.is_skill,
                reason: verdict.reason.clone(),
            };
            if let Err(err) = cache.put(&unit.cache_key, &entry) {
                tracing::warn!(key = %unit.cache_key, error = %err, "cache write failed");
            }
            let db = db.lock().await;
            for url in &unit.urls {
                db.upsert(url, verdict.is_skill, &verdict.reason)?;
                if verdict.is_skill {
                    summary.valid += 1;
                } else {
                    summary.invalid += 1;
                }
            }
        }
        Err(reason) => {
            tracing::warn!(key = %unit.cache_key, reason = %reason, "classification failed");
            let db = db.lock().await;
            for url in &unit.urls {
                db.upsert(url, false, &reason)?;
                summary.errors += 1;
            }
        }
    }
    Ok(())
}

/// Bounded-concurrency individual calls; results are persisted in
/// completion order, not submission order.
async fn classify_concurrent(
    config: &FilterConfig,
    client: &ClassifierClient,
    cache: &dyn VerdictCache,
    db: &Arc<Mutex<ValidationDb>>,
    units: Vec<PendingUnit>,
    summary: &mut RunSummary,
) -> Result<()> {
    let total = units.len();
    let mut done = 0usize;

    let mut outcomes = futures::stream::iter(units.into_iter().map(|unit| async move {
        let outcome = client.classify(&unit.content).await;
        (unit, outcome)
    }))
    .buffer_unordered(config.max_concurrent.max(1));

    while let Some((unit, outcome)) = outcomes.next().await {
        let outcome = outcome.map_err(|err| err.verdict_reason());
        record_outcome(cache, db, &unit, outcome, summary).await?;

        done += 1;
        if done % PROGRESS_EVERY == 0 {
            tracing::info!(done, total, "classification progress");
        }
    }
    Ok(())
}

/// Message Batches strategy: pack, then submit each chunk and poll it to
/// completion before the next one.
async fn classify_batches(
    config: &FilterConfig,
    client: &ClassifierClient,
    cache: &dyn VerdictCache,
    db: &Arc<Mutex<ValidationDb>>,
    units: Vec<PendingUnit>,
    summary: &mut RunSummary,
) -> Result<()> {
    let chunks = pack(units, BATCH_CHUNK_SIZE, BATCH_TOKEN_BUDGET);

    for chunk in chunks {
        match run_chunk(config, client, &chunk).await {
            Ok(outcomes) => {
                let by_key: HashMap<&str, &PendingUnit> = chunk
                    .iter()
                    .map(|unit| (unit.cache_key.as_str(), unit))
                    .collect();
                for outcome in outcomes {
                    let Some(unit) = by_key.get(outcome.custom_id.as_str()) else {
                        tracing::warn!(custom_id = %outcome.custom_id, "result for unknown unit");
                        continue;
                    };
                    record_outcome(cache, db, unit, outcome.verdict, summary).await?;
                }
            }
            Err(err) => {
                // Batch-level failure: record a failure verdict for the
                // whole chunk and keep going; the next run retries them.
                let reason = err.verdict_reason();
                tracing::error!(error = %err, "batch submission failed");
                for unit in &chunk {
                    record_outcome(cache, db, unit, Err(reason.clone()), summary).await?;
                }
            }
        }
    }
    Ok(())
}

async fn run_chunk(
    config: &FilterConfig,
    client: &ClassifierClient,
    chunk: &[PendingUnit],
) -> Result<Vec<crate::batch::BatchOutcome>> {
    let batch = client.submit_batch(chunk).await?;
    tracing::info!(batch = %batch.id, requests = chunk.len(), "submitted batch");
    let finished = client
        .poll_batch(&batch.id, config.poll_interval, chunk.len())
        .await?;
    client.batch_results(&finished).await
}
