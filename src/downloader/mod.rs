//! Attachment downloader split into focused submodules:
//! - [`worker`] - Single-attachment download and the worker loop
//! - [`pipeline`] - Directory setup, dedup/worker wiring and the completion signal
//! - [`channels`] - Per-channel runs and the fail-on-error policy

mod channels;
mod pipeline;
mod worker;


pub use channels::{ChannelReport, DumpSummary};
pub use pipeline::Completion;

use std::sync::Arc;

use crate::config::{Config, FilesConfig};
use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::reporter::{Reporter, TracingReporter};
use crate::transport::{FileFetcher, HttpFetcher};

/// Concurrent, rate-limited attachment downloader
///
/// Cheap to clone; clones share the fetcher, the limiter and the reporter.
///
/// # Example
///
/// ```no_run
/// use attachment_dl::{ChannelFileSet, Config, FileDownloader};
/// use attachment_dl::types::Channel;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(channel: Channel) -> attachment_dl::Result<()> {
/// let downloader = FileDownloader::from_config(&Config::default())?;
/// let files = ChannelFileSet::from_channel(&channel);
///
/// let completion = downloader
///     .start("./files", files.into_stream(), CancellationToken::new())
///     .await?;
/// completion.wait().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FileDownloader {
    pub(crate) config: Arc<FilesConfig>,
    pub(crate) fetcher: Arc<dyn FileFetcher>,
    pub(crate) limiter: Arc<dyn RateLimiter>,
    pub(crate) reporter: Arc<dyn Reporter>,
}

impl FileDownloader {
    /// Create a downloader from its collaborators
    ///
    /// The limiter is shared by every worker of every run started from this
    /// downloader. Events go to a [`TracingReporter`] until
    /// [`with_reporter`](Self::with_reporter) replaces it.
    pub fn new(
        config: FilesConfig,
        fetcher: Arc<dyn FileFetcher>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            limiter,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Validate `config` and build a downloader with the HTTP transport and
    /// the configured rate limit
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config.http, &config.retry)?;
        Ok(Self::new(
            config.files.clone(),
            Arc::new(fetcher),
            config.rate_limit.build(),
        ))
    }

    /// Send events to `reporter` instead
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Download settings in use
    pub fn config(&self) -> &FilesConfig {
        &self.config
    }
}
