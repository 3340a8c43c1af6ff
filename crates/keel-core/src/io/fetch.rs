//! Artifact retrieval with bounded retry.
//!
//! A [`Fetcher`] turns a locator (URL or local path) into bytes and sorts
//! failures into transient (worth retrying) and fatal. [`fetch_with_retry`]
//! applies a [`RetryPolicy`] with exponential backoff on top of any fetcher.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeouts, connection resets, 5xx and similar. Retrying may help.
    #[error("transient error fetching {locator}: {reason}")]
    Transient { locator: String, reason: String },

    /// Not found, forbidden, malformed locator. Retrying will not help.
    #[error("failed to fetch {locator}: {reason}")]
    Fatal { locator: String, reason: String },
}

impl FetchError {
    pub fn transient(locator: &str, reason: impl ToString) -> Self {
        Self::Transient {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn fatal(locator: &str, reason: impl ToString) -> Self {
        Self::Fatal {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Retrieves raw artifact bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        (**self).fetch(locator).await
    }
}

/// Retry settings for transient fetch failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means try once.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    const MAX_DELAY: Duration = Duration::from_secs(60);

    /// No retries, no waiting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= Self::MAX_DELAY.as_secs_f64() {
            return Self::MAX_DELAY;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Fetch with up to `policy.max_retries` retries on transient errors.
///
/// `on_retry(retry, delay, error)` is called before each wait. A transient
/// error returned from here means retries were exhausted.
///
/// # Errors
///
/// Returns the first fatal error, or the last transient one.
pub async fn fetch_with_retry<F, R>(
    fetcher: &F,
    locator: &str,
    policy: &RetryPolicy,
    mut on_retry: R,
) -> Result<Bytes, FetchError>
where
    F: Fetcher + ?Sized,
    R: FnMut(u32, Duration, &FetchError),
{
    let mut retry = 0;
    loop {
        match fetcher.fetch(locator).await {
            Ok(bytes) => {
                debug!(locator, bytes = bytes.len(), retries = retry, "fetched");
                return Ok(bytes);
            }
            Err(e) if e.is_transient() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay_for(retry);
                warn!(locator, retry, ?delay, error = %e, "transient fetch failure, retrying");
                on_retry(retry, delay, &e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reads artifacts from the local filesystem (`file://` or a bare path).
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_of(locator: &str) -> PathBuf {
        PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        let path = Self::path_of(locator);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => match e.kind() {
                std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock => Err(FetchError::transient(locator, e)),
                _ => Err(FetchError::fatal(locator, e)),
            },
        }
    }
}

/// Fetches over HTTP(S).
#[cfg(feature = "network")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "network")]
impl HttpFetcher {
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn classify(locator: &str, err: &reqwest::Error) -> FetchError {
        if let Some(status) = err.status() {
            return Self::classify_status(locator, status);
        }
        if err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() {
            FetchError::transient(locator, err)
        } else {
            FetchError::fatal(locator, err)
        }
    }

    fn classify_status(locator: &str, status: reqwest::StatusCode) -> FetchError {
        use reqwest::StatusCode;
        let transient = status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT;
        if transient {
            FetchError::transient(locator, format!("HTTP {status}"))
        } else {
            FetchError::fatal(locator, format!("HTTP {status}"))
        }
    }
}

#[cfg(feature = "network")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| Self::classify(locator, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify_status(locator, status));
        }

        response
            .bytes()
            .await
            .map_err(|e| Self::classify(locator, &e))
    }
}

/// Dispatches on the locator: `http(s)://` goes over the network, anything
/// else is read from disk.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    #[cfg(feature = "network")]
    http: HttpFetcher,
    file: FileFetcher,
}

impl DefaultFetcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    #[cfg(feature = "network")]
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = HttpFetcher::new(timeout).map_err(|e| FetchError::fatal("http client", e))?;
        Ok(Self {
            http,
            file: FileFetcher,
        })
    }

    /// # Errors
    ///
    /// Never fails without the `network` feature.
    #[cfg(not(feature = "network"))]
    pub fn new(_timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self { file: FileFetcher })
    }
}

fn is_http(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

#[async_trait]
impl Fetcher for DefaultFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        if is_http(locator) {
            #[cfg(feature = "network")]
            return self.http.fetch(locator).await;
            #[cfg(not(feature = "network"))]
            return Err(FetchError::fatal(locator, "built without network support"));
        }
        self.file.fetch(locator).await
    }
}
