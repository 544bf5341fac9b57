//! Core types for attachment-dl

use serde::{Deserialize, Serialize};

/// Unique identifier for an attachment, stable across the workspace
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(pub String);

impl AttachmentId {
    /// Create a new AttachmentId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttachmentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AttachmentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A downloadable file referenced by a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Workspace-wide unique id
    pub id: AttachmentId,
    /// Display name
    pub name: String,
    /// Size in bytes as reported by the source
    #[serde(default)]
    pub size: u64,
    /// Private download URL
    pub url_private_download: String,
}

impl Attachment {
    /// Name of the file this attachment is saved as: `<id>-<name>`
    ///
    /// Path separators in the display name are replaced so the file always
    /// stays inside the target directory.
    pub fn filename(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("{}-{}", self.id, name)
    }
}

/// A threaded reply; replies do not nest further
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Message timestamp
    #[serde(default)]
    pub ts: String,
    /// Attachments carried by the reply
    #[serde(default)]
    pub files: Vec<Attachment>,
}

/// A conversation entry with its attachments and threaded replies
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message timestamp
    #[serde(default)]
    pub ts: String,
    /// Attachments carried directly by the message
    #[serde(default)]
    pub files: Vec<Attachment>,
    /// Replies in the message's thread
    #[serde(default)]
    pub thread_replies: Vec<Reply>,
}

/// A conversation as delivered by the conversation-fetch collaborator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier
    pub id: String,
    /// Messages in original order
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Attachments extracted from one channel, in extraction order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelFileSet {
    /// Channel the files were extracted from
    pub channel_id: String,
    /// Attachments, repeats included
    pub files: Vec<Attachment>,
}

impl ChannelFileSet {
    /// Consume the set as a stream suitable for the download pipeline
    pub fn into_stream(self) -> futures::stream::Iter<std::vec::IntoIter<Attachment>> {
        futures::stream::iter(self.files)
    }
}

/// Result of a single attachment download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Attachment that was processed
    pub attachment_id: AttachmentId,
    /// File name inside the target directory
    pub filename: String,
    /// Bytes written to disk
    pub bytes_written: u64,
    /// Failure description, `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadOutcome {
    /// Whether the download succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Lifecycle of one pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Run constructed, nothing on disk yet
    Created,
    /// Target directory exists
    DirectoryReady,
    /// Dedup stage and workers are running
    WorkersRunning,
    /// Input exhausted and queue closed; workers finishing remaining items
    Draining,
    /// Every worker has exited
    Completed,
}

/// Event emitted by the pipeline for each attachment it handles
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A repeated attachment was dropped by the dedup stage
    DuplicateSkipped {
        /// Attachment id
        id: AttachmentId,
        /// File name it would have been saved as
        filename: String,
    },

    /// A worker picked up an attachment
    Started {
        /// Attachment id
        id: AttachmentId,
        /// File name inside the target directory
        filename: String,
        /// Size reported by the source
        size: u64,
        /// Index of the worker handling it
        worker: usize,
    },

    /// A worker finished an attachment, successfully or not
    Finished(DownloadOutcome),

    /// The run was cancelled while a worker was transferring this attachment
    ///
    /// Not a failure: nothing is left on disk and the attachment can be
    /// fetched again by a later run.
    Cancelled {
        /// Attachment id
        id: AttachmentId,
        /// File name it was being saved as
        filename: String,
    },
}
