//! Reads from the collector's database, joined against the validated set.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use skillscan_core::parse_github_url;

use crate::{ExportError, Result};

/// One row of `files.parquet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub url: String,
    pub sha: Option<String>,
    pub size_bytes: Option<i64>,
    pub discovered_at: Option<String>,
    /// `owner/repo`, the foreign key into repos.
    pub repo_key: Option<String>,
    pub filename: Option<String>,
    pub path: Option<String>,
}

/// One row of `repos.parquet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRow {
    pub repo_key: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub stars: Option<i64>,
    pub forks: Option<i64>,
    pub watchers: Option<i64>,
    pub language: Option<String>,
    pub topics: Option<Vec<String>>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// One row of `history.parquet` (one commit per row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub url: String,
    pub commit_sha: Option<String>,
    pub commit_author: Option<String>,
    pub commit_date: Option<String>,
    pub commit_message: Option<String>,
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// URLs recorded as valid skills in the validation database.
pub fn load_valid_urls(validation_db: &Path) -> Result<HashSet<String>> {
    let conn = open_read_only(validation_db)?;
    let mut stmt =
        conn.prepare("SELECT url FROM validation_results WHERE is_skill = 1")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut urls = HashSet::new();
    for row in rows {
        urls.insert(row?);
    }
    Ok(urls)
}

/// Upstream file rows restricted to validated URLs, with derived
/// `repo_key`/`filename`/`path` columns.
pub fn load_file_rows(main_db: &Path, valid_urls: &HashSet<String>) -> Result<Vec<FileRow>> {
    let conn = open_read_only(main_db)?;
    let mut stmt =
        conn.prepare("SELECT url, sha, size_bytes, discovered_at FROM files")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut files = Vec::new();
    for row in rows {
        let (url, sha, size_bytes, discovered_at) = row?;
        if !valid_urls.contains(&url) {
            continue;
        }
        let parsed = parse_github_url(&url);
        files.push(FileRow {
            repo_key: parsed
                .as_ref()
                .map(|p| format!("{}/{}", p.owner, p.repo)),
            filename: url.rsplit('/').next().map(str::to_string),
            path: parsed.map(|p| p.path),
            url,
            sha,
            size_bytes,
            discovered_at,
        });
    }
    Ok(files)
}

/// Repo metadata restricted to the repo keys the exported files reference.
///
/// Returns [`ExportError::MissingData`] when referenced repos have no
/// metadata, unless `allow_missing`.
pub fn load_repo_rows(
    main_db: &Path,
    files: &[FileRow],
    allow_missing: bool,
) -> Result<Vec<RepoRow>> {
    let needed: BTreeSet<&str> = files
        .iter()
        .filter_map(|file| file.repo_key.as_deref())
        .collect();

    let conn = open_read_only(main_db)?;
    let mut stmt = conn.prepare(
        "SELECT repo_key, stars, forks, watchers, language, topics, description, license, \
         created_at, updated_at FROM repo_metadata",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, Option<i64>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, Option<String>>(9)?,
        ))
    })?;

    let mut by_key = HashMap::new();
    for row in rows {
        let (repo_key, stars, forks, watchers, language, topics, description, license, created_at, updated_at) =
            row?;
        if !needed.contains(repo_key.as_str()) {
            continue;
        }
        let (repo_owner, repo_name) = split_repo_key(&repo_key);
        by_key.insert(
            repo_key.clone(),
            RepoRow {
                repo_owner,
                repo_name,
                repo_key,
                stars,
                forks,
                watchers,
                language,
                topics: topics.as_deref().and_then(decode_topics),
                description,
                license,
                created_at,
                updated_at,
            },
        );
    }

    let missing: Vec<&str> = needed
        .iter()
        .filter(|key| !by_key.contains_key(**key))
        .copied()
        .collect();
    if !missing.is_empty() {
        let sample = missing.iter().take(10).copied().collect::<Vec<_>>().join(", ");
        let message = format!(
            "{} valid files have no repo metadata (e.g. {sample})",
            missing.len()
        );
        if !allow_missing {
            return Err(ExportError::MissingData(format!(
                "{message}\nUse --allow-no-repo to export anyway."
            )));
        }
        tracing::warn!("{message}");
    }

    Ok(needed
        .iter()
        .filter_map(|key| by_key.remove(*key))
        .collect())
}

/// Commit history exploded to one row per commit, restricted to exported
/// files.
///
/// Files with no history entry yield a single null-commit row when
/// `allow_missing`, and [`ExportError::MissingData`] otherwise.
pub fn load_history_rows(
    main_db: &Path,
    files: &[FileRow],
    allow_missing: bool,
) -> Result<Vec<HistoryRow>> {
    let conn = open_read_only(main_db)?;
    let mut stmt = conn.prepare("SELECT url, commits FROM file_history")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
        ))
    })?;

    let mut commits_by_url: HashMap<String, Option<String>> = HashMap::new();
    for row in rows {
        let (url, commits) = row?;
        commits_by_url.insert(url, commits);
    }

    let missing: Vec<&str> = files
        .iter()
        .filter(|file| !commits_by_url.contains_key(&file.url))
        .map(|file| file.url.as_str())
        .collect();
    if !missing.is_empty() {
        let message = format!(
            "{} valid files have no history (e.g. {})",
            missing.len(),
            missing[0]
        );
        if !allow_missing {
            return Err(ExportError::MissingData(format!(
                "{message}\nUse --allow-no-history to export anyway."
            )));
        }
        tracing::warn!("{message}");
    }

    let mut history = Vec::new();
    for file in files {
        let raw = commits_by_url.get(&file.url).and_then(Option::as_deref);
        let commits = raw.and_then(|raw| match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(entries)) => Some(entries),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(url = %file.url, error = %err, "unparseable commit history");
                None
            }
        });
        match commits {
            Some(entries) if !entries.is_empty() => {
                for entry in entries {
                    history.push(HistoryRow {
                        url: file.url.clone(),
                        commit_sha: string_field(&entry, "sha"),
                        commit_author: string_field(&entry, "author"),
                        commit_date: string_field(&entry, "date"),
                        commit_message: string_field(&entry, "message"),
                    });
                }
            }
            _ => history.push(HistoryRow {
                url: file.url.clone(),
                commit_sha: None,
                commit_author: None,
                commit_date: None,
                commit_message: None,
            }),
        }
    }
    Ok(history)
}

fn split_repo_key(repo_key: &str) -> (String, String) {
    match repo_key.split_once('/') {
        Some((owner, name)) => (owner.to_string(), name.to_string()),
        None => (repo_key.to_string(), String::new()),
    }
}

/// Topics are stored as a JSON array of strings.
fn decode_topics(raw: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(topics) => Some(topics),
        Err(err) => {
            tracing::debug!(error = %err, "unparseable topics column");
            None
        }
    }
}

fn string_field(entry: &Value, key: &str) -> Option<String> {
    entry.get(key).and_then(Value::as_str).map(str::to_string)
}
