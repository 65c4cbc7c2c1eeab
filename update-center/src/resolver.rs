use crate::cache::CacheStore;
use crate::metrics_defs::CACHE_SAVE_FAILED;
use crate::upstream::{UpstreamError, UpstreamResolver};
use shared::counter;
use std::sync::{Arc, LazyLock};
use url::Url;

pub const EXPERIMENTAL_UPDATE_CENTER_URL: &str =
    "https://updates.jenkins.io/experimental/update-center.json";

static EXPERIMENTAL_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse(EXPERIMENTAL_UPDATE_CENTER_URL).expect("experimental update center URL is valid")
});

/// What a client asked for when requesting `update-center.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateCenterQuery {
    pub version: String,
    pub provider: String,
    pub json_server: String,
    pub experimental: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("invalid cached URL {url:?}: {source}")]
    InvalidCachedUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Maps a requested version to the update center URL of the upstream, asking the
/// upstream only when the version is not cached yet.
#[derive(Clone)]
pub struct UpdateCenterResolver {
    cache: Arc<dyn CacheStore>,
    upstream: Arc<dyn UpstreamResolver>,
}

impl UpdateCenterResolver {
    pub fn new(cache: Arc<dyn CacheStore>, upstream: Arc<dyn UpstreamResolver>) -> Self {
        UpdateCenterResolver { cache, upstream }
    }

    /// Returns the cached URL for the version, or resolves it upstream and caches it.
    ///
    /// If the resolved URL cannot be cached, the version is resolved once more
    /// and caching is attempted again. A cache write failure never fails the
    /// call, only an upstream failure does.
    pub async fn resolve_and_cache(&self, query: &UpdateCenterQuery) -> Result<Url, ResolveError> {
        if query.experimental {
            return Ok(EXPERIMENTAL_URL.clone());
        }

        let version = query.version.as_str();
        if let Some(cached) = self.cache.load(version) {
            tracing::debug!(version, url = %cached, "Cache hit");
            return Url::parse(&cached)
                .map_err(|source| ResolveError::InvalidCachedUrl { url: cached, source });
        }

        let url = self.upstream.resolve(version).await?;
        if let Err(e) = self.cache.save(version, url.as_str()) {
            counter!(CACHE_SAVE_FAILED).increment(1);
            tracing::warn!(version, error = %e, "Could not cache resolved URL, resolving again");

            let url = self.upstream.resolve(version).await?;
            if let Err(e) = self.cache.save(version, url.as_str()) {
                counter!(CACHE_SAVE_FAILED).increment(1);
                tracing::warn!(version, error = %e, "Could not cache resolved URL");
            }
            return Ok(url);
        }

        Ok(url)
    }
}
