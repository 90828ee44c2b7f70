//! Durable verdict storage and the read-only upstream metadata source.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{Connection, OpenFlags, params};

use crate::errors::Result;

/// Reason prefixes marking a verdict as a recorded failure rather than a
/// definitive outcome. Failure rows are re-attempted on the next run;
/// definitive rows are terminal across runs.
pub const FAILURE_REASON_PREFIXES: [&str; 3] = ["API error:", "Parse error:", "Error:"];

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS validation_results (
    url TEXT PRIMARY KEY,
    is_skill BOOLEAN NOT NULL,
    reason TEXT,
    validated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS files (
    url TEXT PRIMARY KEY,
    sha TEXT,
    size_bytes INTEGER,
    discovered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Output database: validation verdicts plus the derived `files` table.
///
/// One verdict per URL, latest write wins. The `files` table is a derived,
/// disposable materialization rebuilt from the upstream source at the end
/// of each run; `validation_results` is the source of truth.
pub struct ValidationDb {
    conn: Connection,
}

impl ValidationDb {
    /// Open the database, creating parent directories and the schema as
    /// needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "validation db initialized");
        Ok(Self { conn })
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::apply_schema(&conn)?;
        Ok(Self { conn })
    }

    fn apply_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Record a verdict, replacing any prior row for the URL.
    pub fn upsert(&self, url: &str, is_skill: bool, reason: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO validation_results (url, is_skill, reason, validated_at)
            VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
            ON CONFLICT(url) DO UPDATE SET
                is_skill = ?2,
                reason = ?3,
                validated_at = CURRENT_TIMESTAMP
            "#,
            params![url, is_skill, reason],
        )?;
        Ok(())
    }

    /// URLs holding a definitive verdict.
    ///
    /// Rows whose reason carries a failure prefix are excluded: a failed
    /// remote call is never cached, so the next run must attempt it again.
    pub fn definitive_urls(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, reason FROM validation_results")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        })?;

        let mut urls = HashSet::new();
        for row in rows {
            let (url, reason) = row?;
            let reason = reason.unwrap_or_default();
            if !FAILURE_REASON_PREFIXES
                .iter()
                .any(|prefix| reason.starts_with(prefix))
            {
                urls.insert(url);
            }
        }
        Ok(urls)
    }

    /// Number of URLs currently recorded as valid skills.
    pub fn count_valid(&self) -> Result<u64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM validation_results WHERE is_skill = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Rebuild the derived `files` table from the upstream source, keeping
    /// only rows whose URL has a valid verdict. Full rebuild, not an
    /// incremental update.
    pub fn rebuild_files(&self, main_db: &Path) -> Result<usize> {
        self.conn.execute(
            "ATTACH DATABASE ?1 AS src",
            params![main_db.to_string_lossy().into_owned()],
        )?;
        let rebuilt = (|| -> Result<usize> {
            self.conn.execute("DELETE FROM files", [])?;
            let inserted = self.conn.execute(
                r#"
                INSERT OR IGNORE INTO files (url, sha, size_bytes, discovered_at)
                SELECT f.url, f.sha, f.size_bytes, f.discovered_at
                FROM src.files AS f
                WHERE f.url IN (SELECT url FROM validation_results WHERE is_skill = 1)
                "#,
                [],
            )?;
            Ok(inserted)
        })();
        self.conn.execute("DETACH DATABASE src", [])?;
        rebuilt
    }
}

/// Read-only view of the upstream collector's database.
pub struct SourceDb {
    conn: Connection,
}

impl SourceDb {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Every candidate URL known upstream.
    pub fn all_file_urls(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT url FROM files")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut urls = Vec::new();
        for row in rows {
            urls.push(row?);
        }
        Ok(urls)
    }
}
