//! # attachment-dl
//!
//! Concurrent, rate-limited downloader for the files attached to a
//! conversation: messages and their threaded replies.
//!
//! ## Pipeline
//!
//! - **Extract** - walk messages and replies into an ordered list of attachments
//! - **Dedup** - a single task admits each attachment id once into a bounded queue
//! - **Download** - N workers drain the queue, saving `<id>-<name>` files and
//!   taking one permit from a shared rate limiter per transfer
//! - **Complete** - a [`Completion`] fires once every worker has exited
//!
//! Per-attachment results never fail a run. They are delivered as [`Event`]s
//! to a [`Reporter`](reporter::Reporter).
//!
//! ## Quick Start
//!
//! ```no_run
//! use attachment_dl::{ChannelFileSet, Config, FileDownloader};
//! use attachment_dl::types::Channel;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json(r#"{ "files": { "workers": 8 } }"#)?;
//!     let downloader = FileDownloader::from_config(&config)?;
//!
//!     let channel: Channel = serde_json::from_str(&std::fs::read_to_string("C0123.json")?)?;
//!     let files = ChannelFileSet::from_channel(&channel);
//!
//!     downloader
//!         .download_channel("./C0123", files, CancellationToken::new())
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Deduplication stage
pub mod dedup;
/// Download pool and pipeline coordinator
pub mod downloader;
/// Error types
pub mod error;
/// Attachment extraction
pub mod extract;
/// Request rate limiting with token bucket
pub mod rate_limiter;
/// Per-item event reporting
pub mod reporter;
/// Retry logic with exponential backoff
pub mod retry;
/// Attachment transport
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, FilesConfig, HttpConfig, RateLimitConfig, RetryConfig};
pub use downloader::{ChannelReport, Completion, DumpSummary, FileDownloader};
pub use error::{DownloadError, Error, FetchError, Result};
pub use extract::files_from_messages;
pub use rate_limiter::{RateLimiter, TokenBucket, Unlimited};
pub use reporter::{BroadcastReporter, DownloadCounter, DownloadStats, Reporter, TracingReporter};
pub use transport::{FileFetcher, HttpFetcher};
pub use types::{
    Attachment, AttachmentId, Channel, ChannelFileSet, DownloadOutcome, Event, Message,
    PipelineState, Reply,
};
