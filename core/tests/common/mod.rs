#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use serde_json::json;
use skillscan_core::FilterConfig;

/// Temp workspace plus a config pointed at a mock endpoint, with fast
/// retry/poll tuning so failure paths don't slow the suite down.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: FilterConfig,
}

pub fn fixture(api_base: &str) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = FilterConfig::new(
        dir.path().join("main.db"),
        dir.path().join("validation.db"),
        dir.path().join("content"),
        dir.path().join("cache"),
    );
    config.api_base = api_base.to_string();
    config.api_key = Some("test-key".to_string());
    config.max_concurrent = 4;
    config.retry_initial_delay = Duration::from_millis(10);
    config.poll_interval = Duration::from_millis(10);
    Fixture { dir, config }
}

pub fn skill_url(repo: &str) -> String {
    format!("https://github.com/acme/{repo}/blob/main/SKILL.md")
}

pub fn seed_main_db(path: &Path, urls: &[&str]) {
    let conn = Connection::open(path).expect("open main db");
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            url TEXT PRIMARY KEY,
            sha TEXT,
            size_bytes INTEGER,
            discovered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .expect("main schema");
    for url in urls {
        conn.execute(
            "INSERT OR IGNORE INTO files (url, sha, size_bytes) VALUES (?1, 'sha', 1)",
            [url],
        )
        .expect("insert url");
    }
}

pub fn write_content(content_dir: &Path, repo: &str, content: &str) {
    let dir = content_dir.join("acme").join(repo).join("blob").join("main");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("SKILL.md"), content).expect("write content");
}

pub fn verdict_rows(db: &Path) -> Vec<(String, bool, String)> {
    let conn = Connection::open(db).expect("open validation db");
    let mut stmt = conn
        .prepare("SELECT url, is_skill, reason FROM validation_results ORDER BY url")
        .expect("prepare");
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .expect("query");
    rows.map(|row| row.expect("row")).collect()
}

pub fn cache_entry_count(cache_dir: &Path) -> usize {
    match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

/// A Messages API success body whose single text block is `text`.
pub fn message_body(text: &str) -> serde_json::Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": "claude-haiku-4-5-20251001",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 5}
    })
}

/// A Messages API error body in the documented shape.
pub fn error_body(error_type: &str, message: &str) -> serde_json::Value {
    json!({
        "type": "error",
        "error": {"type": error_type, "message": message}
    })
}
