use crate::metrics_defs::{UPSTREAM_RESOLVE, UPSTREAM_RESOLVE_DURATION};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use shared::{counter, histogram};
use std::time::Instant;
use url::Url;

pub const DEFAULT_UPSTREAM_URL: &str = "https://updates.jenkins.io/update-center.json";

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream answered {0} instead of a redirect")]
    NotRedirected(StatusCode),

    #[error("upstream redirect has no Location header")]
    MissingLocation,

    #[error("invalid redirect location: {0}")]
    InvalidLocation(String),
}

/// Asks the authority where the update center of a given version lives.
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    async fn resolve(&self, version: &str) -> Result<Url, UpstreamError>;
}

/// Resolves versions against the official Jenkins update site, which answers
/// `update-center.json?version=V` with a redirect to the matching manifest.
pub struct JenkinsUpstream {
    client: reqwest::Client,
    url: Url,
}

impl JenkinsUpstream {
    pub fn new(url: Url) -> Result<Self, UpstreamError> {
        // Redirects must not be followed, the first Location is the answer.
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;

        Ok(JenkinsUpstream { client, url })
    }

    async fn fetch_location(&self, version: &str) -> Result<Url, UpstreamError> {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("version", version);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_redirection() {
            return Err(UpstreamError::NotRedirected(status));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or(UpstreamError::MissingLocation)?
            .to_str()
            .map_err(|e| UpstreamError::InvalidLocation(e.to_string()))?;

        // Relative locations are resolved against the request URL
        url.join(location)
            .map_err(|e| UpstreamError::InvalidLocation(e.to_string()))
    }
}

#[async_trait]
impl UpstreamResolver for JenkinsUpstream {
    async fn resolve(&self, version: &str) -> Result<Url, UpstreamError> {
        let start = Instant::now();
        let result = self.fetch_location(version).await;
        histogram!(UPSTREAM_RESOLVE_DURATION).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(url) => {
                counter!(UPSTREAM_RESOLVE, "result" => "ok").increment(1);
                tracing::debug!(version, %url, "Resolved version from upstream");
            }
            Err(e) => {
                counter!(UPSTREAM_RESOLVE, "result" => "error").increment(1);
                tracing::warn!(version, error = %e, "Upstream resolution failed");
            }
        }
        result
    }
}
