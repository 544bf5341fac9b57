//! Deduplication stage
//!
//! A single task sits between the extracted attachment stream and the worker
//! queue. It owns both the [`SeenSet`] and the queue sender, so neither needs
//! synchronization: workers only ever receive.

use std::collections::HashSet;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::reporter::Reporter;
use crate::types::{Attachment, AttachmentId, Event};

/// Ids admitted to the download queue during one run
///
/// Grows monotonically and is dropped with the run.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<AttachmentId>,
}

impl SeenSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`; returns `true` the first time an id is seen
    pub fn admit(&mut self, id: &AttachmentId) -> bool {
        self.seen.insert(id.clone())
    }

    /// Whether `id` was already admitted
    pub fn contains(&self, id: &AttachmentId) -> bool {
        self.seen.contains(id)
    }

    /// Number of distinct ids admitted
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing was admitted yet
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Forward the first occurrence of every attachment from `input` into `queue`
///
/// Returns the number of admitted attachments. The queue is closed (the
/// sender dropped) when `input` ends or `cancel` fires, whichever comes
/// first. A full queue makes this stage wait.
pub async fn seen_filter<S>(
    input: S,
    queue: mpsc::Sender<Attachment>,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> usize
where
    S: Stream<Item = Attachment>,
{
    let mut input = std::pin::pin!(input);
    let mut seen = SeenSet::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = input.next() => item,
        };
        let Some(attachment) = next else {
            break;
        };

        if !seen.admit(&attachment.id) {
            reporter.report(&Event::DuplicateSkipped {
                id: attachment.id.clone(),
                filename: attachment.filename(),
            });
            continue;
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = queue.send(attachment) => sent,
        };
        if sent.is_err() {
            // every worker is gone; nothing left to feed
            tracing::debug!("Download queue closed by receivers, stopping dedup stage");
            break;
        }
    }

    seen.len()
}
