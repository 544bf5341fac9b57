//! Attachment extraction from channel messages
//!
//! Extraction is a pure walk: no I/O, no filtering. Repeats are kept and
//! handled later by the dedup stage.

use crate::types::{Attachment, Channel, ChannelFileSet, Message};

/// Collect every attachment referenced by `messages`
///
/// For each message in order, its own attachments come first, followed by
/// the attachments of each of its thread replies.
pub fn files_from_messages(messages: &[Message]) -> Vec<Attachment> {
    let mut files = Vec::new();
    for message in messages {
        files.extend(message.files.iter().cloned());
        // include threaded files
        for reply in &message.thread_replies {
            files.extend(reply.files.iter().cloned());
        }
    }
    files
}

impl ChannelFileSet {
    /// Extract the attachments of a channel
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            channel_id: channel.id.clone(),
            files: files_from_messages(&channel.messages),
        }
    }
}
