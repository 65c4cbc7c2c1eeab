use crate::cache::{CacheError, CacheStore};
use crate::upstream::{UpstreamError, UpstreamResolver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// Upstream that answers `<prefix><version>` and counts its calls.
pub struct FakeUpstream {
    prefix: Option<String>,
    calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn with_prefix(prefix: &str) -> Self {
        FakeUpstream {
            prefix: Some(prefix.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        FakeUpstream {
            prefix: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamResolver for FakeUpstream {
    async fn resolve(&self, version: &str) -> Result<Url, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.prefix {
            Some(prefix) => Url::parse(&format!("{prefix}{version}"))
                .map_err(|e| UpstreamError::InvalidLocation(e.to_string())),
            None => Err(UpstreamError::MissingLocation),
        }
    }
}

/// In-memory cache counting loads and saves. A failing cache rejects every save.
#[derive(Default)]
pub struct FakeCache {
    entries: Mutex<HashMap<String, String>>,
    fail_saves: bool,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl FakeCache {
    pub fn failing() -> Self {
        FakeCache {
            fail_saves: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.into(), value.into());
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CacheStore for FakeCache {
    fn load(&self, key: &str) -> Option<String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(CacheError::Io(io::Error::other("disk full")));
        }
        self.insert(key, value);
        Ok(())
    }
}
