//! Error types for attachment-dl
//!
//! Errors are split by how far they travel:
//! - [`Error`] is returned to the caller (pre-flight failures, bad configuration)
//! - [`DownloadError`] describes a single failed attachment and never aborts a run
//! - [`FetchError`] classifies transport failures so the retry layer can decide
//!   whether another attempt makes sense

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::AttachmentId;

/// Result type alias for attachment-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for attachment-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// The target directory could not be created; no worker was started
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A channel run recorded failed downloads while fail-on-error is enabled
    #[error("{failed} file download(s) failed in channel {channel_id}")]
    ChannelFailed {
        /// Channel whose run recorded failures
        channel_id: String,
        /// Number of attachments that failed in that run
        failed: u64,
    },

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failure of a single attachment download
///
/// These are reported and logged, then the worker moves on to the next item.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The destination file could not be created
    #[error("failed to create {path}: {source}")]
    CreateFile {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The bytes could not be transferred into the destination file
    #[error("failed to download attachment {id}: {source}")]
    Transfer {
        /// Attachment being transferred
        id: AttachmentId,
        /// Transport failure
        #[source]
        source: FetchError,
    },

    /// The run was cancelled while this attachment was in flight
    #[error("download of attachment {id} cancelled")]
    Cancelled {
        /// Attachment that was in flight
        id: AttachmentId,
    },
}

/// Transport-level failure while fetching a URL
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL (without credentials)
        url: String,
        /// Server-provided `Retry-After` delay, if any
        retry_after: Option<Duration>,
    },

    /// The request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing the body to the destination failed
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The attachment URL could not be parsed
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parse failure
        #[source]
        source: url::ParseError,
    },
}
