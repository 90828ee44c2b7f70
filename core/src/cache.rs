//! Durable verdict cache keyed by rendered-prompt hash.
//!
//! Entries are written once per unique rendered request and shared across
//! runs and across identifiers that happen to share content. There is no
//! eviction: the cache is append-only and unbounded.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{FilterError, Result};

/// One cached classifier outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedVerdict {
    pub is_skill: bool,
    #[serde(default)]
    pub reason: String,
}

/// Key→verdict store for classifier outcomes.
///
/// Abstract so the backing (flat files, embedded database, remote cache)
/// can be swapped without touching pipeline logic.
pub trait VerdictCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedVerdict>>;
    fn put(&self, key: &str, verdict: &CachedVerdict) -> Result<()>;
}

/// Flat-directory backend: one `{hash}.json` file per key.
#[derive(Debug, Clone)]
pub struct FsVerdictCache {
    dir: PathBuf,
}

impl FsVerdictCache {
    /// Open the cache, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl VerdictCache for FsVerdictCache {
    fn get(&self, key: &str) -> Result<Option<CachedVerdict>> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry = serde_json::from_str(&raw).map_err(|err| {
            FilterError::Cache(format!("corrupt entry {}: {err}", path.display()))
        })?;
        Ok(Some(entry))
    }

    fn put(&self, key: &str, verdict: &CachedVerdict) -> Result<()> {
        // Whole-entry atomic write: a racing writer on the same key may
        // overwrite, never interleave.
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, serde_json::to_vec(verdict)?)?;
        fs::rename(&tmp, self.entry_path(key))?;
        Ok(())
    }
}
