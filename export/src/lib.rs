//! skillscan-export: turn validated verdicts into a distributable dataset.
//!
//! Joins the validated URL set with the collector's repository metadata and
//! commit history, writes three normalized Parquet files, and (optionally)
//! generates Kaggle packaging metadata.

use std::path::PathBuf;

use thiserror::Error;

pub mod metadata;
pub mod rows;
pub mod tables;

/// Export result type.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors raised while exporting the dataset.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Valid files lack expected repo metadata or history.
    #[error("{0}")]
    MissingData(String),
}

/// Configuration for one export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Main database from the collector (read-only).
    pub main_db: PathBuf,
    /// Validation results database produced by the filter pipeline.
    pub validation_db: PathBuf,
    /// Directory receiving the Parquet files and packaging metadata.
    pub output_dir: PathBuf,
    /// Kaggle username; metadata generation is skipped when unset.
    pub kaggle_username: Option<String>,
    /// Export even when valid files lack repo metadata.
    pub allow_no_repo: bool,
    /// Export even when valid files lack commit history.
    pub allow_no_history: bool,
}

/// Row counts of the exported tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub valid_urls: usize,
    pub files: usize,
    pub repos: usize,
    pub history_rows: usize,
}

/// Run the full export: files, repos, history, packaging metadata.
pub fn run_export(config: &ExportConfig) -> Result<ExportSummary> {
    std::fs::create_dir_all(&config.output_dir)?;

    let valid_urls = rows::load_valid_urls(&config.validation_db)?;
    tracing::info!(valid = valid_urls.len(), "loaded valid skill urls");

    let files = rows::load_file_rows(&config.main_db, &valid_urls)?;
    tables::write_files(&config.output_dir.join("files.parquet"), &files)?;
    tracing::info!(rows = files.len(), "wrote files.parquet");

    let repos = rows::load_repo_rows(&config.main_db, &files, config.allow_no_repo)?;
    tables::write_repos(&config.output_dir.join("repos.parquet"), &repos)?;
    tracing::info!(rows = repos.len(), "wrote repos.parquet");

    let history = rows::load_history_rows(&config.main_db, &files, config.allow_no_history)?;
    tables::write_history(&config.output_dir.join("history.parquet"), &history)?;
    tracing::info!(rows = history.len(), "wrote history.parquet");

    if let Some(username) = &config.kaggle_username {
        metadata::write_dataset_metadata(&config.output_dir, username, files.len(), repos.len())?;
    }

    Ok(ExportSummary {
        valid_urls: valid_urls.len(),
        files: files.len(),
        repos: repos.len(),
        history_rows: history.len(),
    })
}
