//! File backed cache of resolved update center URLs, keyed by Jenkins version.
//!
//! The whole mapping is read from disk on every access and written back in full
//! on every save. A missing or unreadable file is treated as an empty cache so a
//! broken cache never blocks a redirect.
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use shared::counter;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("no cache file configured")]
    NoPath,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_yaml::Error),
}

pub trait CacheStore: Send + Sync {
    /// Returns the cached value for `key`, or `None` on a miss or unreadable cache.
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

type Entries = BTreeMap<String, String>;

pub struct FileSystemCache {
    path: Option<PathBuf>,
    // Serializes the read-modify-write cycle of `save`.
    write_lock: Mutex<()>,
}

impl FileSystemCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSystemCache {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// A cache without a backing file. Every load misses and every save fails.
    pub fn unconfigured() -> Self {
        FileSystemCache {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn parse(&self) -> Entries {
        let Some(path) = &self.path else {
            return Entries::new();
        };

        fs::read_to_string(path)
            .ok()
            .and_then(|data| serde_yaml::from_str::<Option<Entries>>(&data).ok())
            .flatten()
            .unwrap_or_default()
    }
}

impl CacheStore for FileSystemCache {
    fn load(&self, key: &str) -> Option<String> {
        let value = self.parse().remove(key).filter(|v| !v.is_empty());
        let metric_def = if value.is_some() {
            CACHE_HIT
        } else {
            CACHE_MISS
        };
        counter!(metric_def).increment(1);
        value
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path.as_ref().ok_or(CacheError::NoPath)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut entries = self.parse();
        entries.insert(key.to_string(), value.to_string());

        let data = serde_yaml::to_string(&entries)?;
        fs::write(path, data)?;

        tracing::debug!(key, path = %path.display(), "Saved cache entry");
        Ok(())
    }
}
