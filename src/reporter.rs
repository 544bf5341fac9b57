//! Per-item event reporting
//!
//! The pipeline never returns per-attachment results to the caller. Instead
//! every skip, start and finish is handed to a [`Reporter`]. The default
//! [`TracingReporter`] turns events into log lines; [`BroadcastReporter`]
//! forwards them to subscribers and [`DownloadCounter`] keeps totals.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Event;

/// Receiver of pipeline events
///
/// Called from the dedup task and from every worker, so implementations must
/// be cheap and must not block.
pub trait Reporter: Send + Sync {
    /// Handle one event
    fn report(&self, event: &Event);
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, event: &Event) {
        (**self).report(event);
    }
}

/// Forward events to two reporters in turn
impl<A: Reporter, B: Reporter> Reporter for (A, B) {
    fn report(&self, event: &Event) {
        self.0.report(event);
        self.1.report(event);
    }
}

/// Reporter that logs events through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &Event) {
        match event {
            Event::DuplicateSkipped { id, filename } => {
                tracing::info!(attachment_id = %id, filename = %filename, "Already seen, skipping");
            }
            Event::Started {
                id,
                filename,
                size,
                worker,
            } => {
                tracing::debug!(attachment_id = %id, filename = %filename, size, worker, "Saving file");
            }
            Event::Cancelled { id, filename } => {
                tracing::info!(attachment_id = %id, filename = %filename, "Download cancelled");
            }
            Event::Finished(outcome) => match &outcome.error {
                None => tracing::info!(
                    attachment_id = %outcome.attachment_id,
                    filename = %outcome.filename,
                    bytes_written = outcome.bytes_written,
                    "File saved"
                ),
                // the worker already logged the failure at warn level
                Some(error) => tracing::debug!(
                    attachment_id = %outcome.attachment_id,
                    filename = %outcome.filename,
                    error = %error,
                    "File not saved"
                ),
            },
        }
    }
}

/// Reporter that publishes events on a broadcast channel
///
/// Slow subscribers lag rather than slow the pipeline down.
#[derive(Clone, Debug)]
pub struct BroadcastReporter {
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl BroadcastReporter {
    /// Create a reporter whose channel buffers up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _rx) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe as a `Stream`; lagged notifications are dropped
    pub fn stream(&self) -> impl futures::Stream<Item = Event> + Send + 'static {
        use futures::StreamExt;

        tokio_stream::wrappers::BroadcastStream::new(self.subscribe())
            .filter_map(|item| futures::future::ready(item.ok()))
    }
}

impl Reporter for BroadcastReporter {
    fn report(&self, event: &Event) {
        // no subscribers is fine
        self.event_tx.send(event.clone()).ok();
    }
}

/// Snapshot of a [`DownloadCounter`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Attachments saved successfully
    pub downloaded: u64,
    /// Attachments whose download failed
    pub failed: u64,
    /// Repeats dropped by the dedup stage
    pub skipped: u64,
    /// Transfers aborted by cancellation
    pub cancelled: u64,
    /// Bytes written by successful downloads
    pub bytes: u64,
}

/// Reporter that counts outcomes
///
/// Used by callers that need an aggregate view, e.g. to apply a
/// fail-on-error policy between runs.
#[derive(Debug, Default)]
pub struct DownloadCounter {
    downloaded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    cancelled: AtomicU64,
    bytes: AtomicU64,
}

impl DownloadCounter {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failed downloads so far
    pub fn failures(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Current totals
    pub fn snapshot(&self) -> DownloadStats {
        DownloadStats {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

impl Reporter for DownloadCounter {
    fn report(&self, event: &Event) {
        match event {
            Event::DuplicateSkipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Event::Started { .. } => {}
            Event::Cancelled { .. } => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            Event::Finished(outcome) if outcome.is_success() => {
                self.downloaded.fetch_add(1, Ordering::Relaxed);
                self.bytes
                    .fetch_add(outcome.bytes_written, Ordering::Relaxed);
            }
            Event::Finished(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
