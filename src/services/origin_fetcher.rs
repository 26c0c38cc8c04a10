//! Single-shot upstream fetches used on a cache miss.

use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no upstream configured")]
    Unconfigured,
    #[error("upstream request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream returned {status}")]
    Status { status: StatusCode, reason: String },
    #[error("request cancelled before upstream answered")]
    Cancelled,
    #[error("path `{0}` cannot be addressed on the upstream")]
    UnaddressablePath(String),
}

impl FetchError {
    /// True when the origin answered and said the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// GETs `<base>/<path>` from the configured upstream. No retries, no timeout
/// beyond the request's own cancellation.
#[derive(Clone, Debug)]
pub struct OriginFetcher {
    client: Client,
    base: Option<Url>,
}

impl OriginFetcher {
    pub fn new(client: Client, base: Option<Url>) -> Self {
        Self { client, base }
    }

    /// A fetcher with no upstream; every fetch fails with `Unconfigured`.
    pub fn disabled() -> Self {
        Self::new(Client::new(), None)
    }

    pub fn is_configured(&self) -> bool {
        self.base.is_some()
    }

    /// Append `path` to the base one segment at a time, so `?`, `#` and `%`
    /// inside the key stay percent-encoded and address the same object the
    /// cache stores. Dot segments would be collapsed by the URL, which would
    /// fetch a different object than the key names, so they are refused.
    fn object_url(base: &Url, path: &str) -> Result<Url, FetchError> {
        let unaddressable = || FetchError::UnaddressablePath(path.to_string());
        if path.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(unaddressable());
        }
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| unaddressable())?
            .pop_if_empty()
            .extend(path.split('/'));
        Ok(url)
    }

    pub async fn fetch(&self, path: &str, cancel: &CancellationToken) -> Result<Bytes, FetchError> {
        let base = self.base.as_ref().ok_or(FetchError::Unconfigured)?;
        let url = Self::object_url(base, path)?;
        debug!(%url, "fetching from upstream");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.get(&url) => result,
        }
    }

    async fn get(&self, url: &Url) -> Result<Bytes, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let reason = status.canonical_reason().unwrap_or("unknown").to_string();
            debug!(%url, %status, %reason, "upstream refused");
            return Err(FetchError::Status { status, reason });
        }
        Ok(response.bytes().await?)
    }
}
