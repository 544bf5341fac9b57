//! Download workers: save one attachment, and the loop draining the queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::DownloadError;
use crate::reporter::Reporter;
use crate::types::{Attachment, DownloadOutcome, Event};

use super::FileDownloader;

/// Receiving end of the download queue, shared by all workers
pub(super) type SharedQueue = Arc<Mutex<mpsc::Receiver<Attachment>>>;

impl FileDownloader {
    /// Save one attachment as `<dir>/<id>-<name>` and return the bytes written
    ///
    /// The rate-limiter permit is taken after the transfer, so the limiter
    /// paces how often requests go out rather than delaying the first one. A
    /// failed or cancelled transfer removes the partial file.
    pub async fn save_file_to(
        &self,
        dir: &Path,
        attachment: &Attachment,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let path = dir.join(attachment.filename());
        let mut file =
            tokio::fs::File::create(&path)
                .await
                .map_err(|source| DownloadError::CreateFile {
                    path: path.clone(),
                    source,
                })?;

        let transfer = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled {
                id: attachment.id.clone(),
            }),
            result = self.fetcher.fetch(&attachment.url_private_download, &mut file) => {
                result.map_err(|source| DownloadError::Transfer {
                    id: attachment.id.clone(),
                    source,
                })
            }
        };

        let written = match transfer {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                remove_partial(&path).await;
                return Err(e);
            }
        };

        if let Err(e) = self.limiter.wait(cancel).await {
            // the file is complete; the worker notices the cancellation next
            tracing::debug!(attachment_id = %attachment.id, error = %e, "Rate limiter wait interrupted");
        }

        Ok(written)
    }

    /// Worker loop: take attachments off the shared queue until it is closed
    /// and drained, or until cancellation. Returns the number processed.
    pub(super) async fn run_worker(
        self,
        worker: usize,
        dir: Arc<PathBuf>,
        queue: SharedQueue,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
    ) -> usize {
        let mut processed = 0;

        loop {
            let next = {
                let mut rx = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = rx.recv() => item,
                }
            };
            let Some(attachment) = next else {
                break;
            };

            let filename = attachment.filename();
            reporter.report(&Event::Started {
                id: attachment.id.clone(),
                filename: filename.clone(),
                size: attachment.size,
                worker,
            });

            let event = match self.save_file_to(&dir, &attachment, &cancel).await {
                Ok(bytes_written) => Event::Finished(DownloadOutcome {
                    attachment_id: attachment.id,
                    filename,
                    bytes_written,
                    error: None,
                }),
                Err(DownloadError::Cancelled { id }) => {
                    tracing::debug!(attachment_id = %id, worker, "Transfer aborted by cancellation");
                    Event::Cancelled { id, filename }
                }
                Err(e) => {
                    tracing::warn!(
                        attachment_id = %attachment.id,
                        filename = %filename,
                        worker,
                        error = %e,
                        "Error saving file"
                    );
                    Event::Finished(DownloadOutcome {
                        attachment_id: attachment.id,
                        filename,
                        bytes_written: 0,
                        error: Some(e.to_string()),
                    })
                }
            };
            reporter.report(&event);
            processed += 1;
        }

        tracing::debug!(worker, processed, "Download worker finished");
        processed
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
}
