//! Reachable-host cache: JSON file `{updated_at, ips}`, atomic replace.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// A cached set is stale once older than this.
const MAX_AGE_MINUTES: i64 = 60;

/// Result of the last full subnet sweep, in discovery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSet {
    pub updated_at: DateTime<Utc>,
    pub ips: Vec<String>,
}

impl HostSet {
    /// Fresh while younger than the staleness threshold.
    pub fn is_fresh(&self) -> bool {
        Utc::now() - self.updated_at < Duration::minutes(MAX_AGE_MINUTES)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// On-disk cache. One lock serializes read and replace so a reader never
/// observes a partially written file; the lock is never held across a
/// sweep.
#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Cache {
    /// Open the cache at `path`, creating an empty set when the file is
    /// missing.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        if !cache.path.exists() {
            if let Some(dir) = cache.path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            cache.replace(&[])?;
        }
        Ok(cache)
    }

    /// Load the persisted set. An empty file is a valid, just-stamped empty
    /// set; corrupt JSON is a hard error.
    pub fn read(&self) -> Result<HostSet, CacheError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let data = std::fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(HostSet {
                updated_at: Utc::now(),
                ips: Vec::new(),
            });
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Overwrite the persisted set with `ips` and a fresh timestamp.
    /// Writes a sibling temp file and renames it over the target, so the
    /// previous content stays authoritative if anything fails.
    pub fn replace(&self, ips: &[String]) -> Result<(), CacheError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let set = HostSet {
            updated_at: Utc::now(),
            ips: ips.to_vec(),
        };
        let data = serde_json::to_vec(&set)?;
        let dir = self.path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &data)?;
        tmp.persist(&self.path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}
