//! Attachment transport
//!
//! [`FileFetcher`] is the seam between the worker pool and whatever moves the
//! bytes. [`HttpFetcher`] is the production implementation on top of reqwest.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::{HttpConfig, RetryConfig};
use crate::error::{Error, FetchError, Result};
use crate::retry::with_retry;

/// Streams the bytes behind a URL into a writer
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch `url` into `dest` and return the number of bytes written
    ///
    /// Dropping the returned future aborts the transfer.
    async fn fetch(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::result::Result<u64, FetchError>;
}

/// HTTP(S) transport with auth, file-token decoration and retries
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    token: Option<String>,
    file_token: Option<String>,
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Build a fetcher from the HTTP and retry settings
    pub fn new(http: &HttpConfig, retry: &RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http.timeout)
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            token: http.token.clone(),
            file_token: http.file_token.clone(),
            retry: retry.clone(),
        })
    }

    /// URL actually requested for an attachment: the file token, if any, is
    /// appended as the `t` query parameter
    fn authorize(&self, url: &str) -> std::result::Result<url::Url, FetchError> {
        let mut parsed = url::Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if let Some(token) = &self.file_token {
            parsed.query_pairs_mut().append_pair("t", token);
        }
        Ok(parsed)
    }

    /// Send the request and check the status; retried as a unit
    async fn request(
        &self,
        url: &url::Url,
        display_url: &str,
    ) -> std::result::Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(redact)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: display_url.to_string(),
                retry_after: retry_after(&response),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> std::result::Result<u64, FetchError> {
        let authorized = self.authorize(url)?;

        // Only the request is retried; once the body starts flowing into
        // `dest` a failure is final.
        let mut response = with_retry(&self.retry, || self.request(&authorized, url)).await?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(redact)? {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;

        Ok(written)
    }
}

/// Drop the request URL from a reqwest error; it carries the file token
fn redact(error: reqwest::Error) -> FetchError {
    FetchError::Http(error.without_url())
}

/// `Retry-After` in its delay-seconds form
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
