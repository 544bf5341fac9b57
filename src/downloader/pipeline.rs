//! Pipeline coordinator: directory setup, dedup and worker wiring, and the
//! completion signal.
//!
//! One run moves through [`PipelineState`]:
//! `Created → DirectoryReady → WorkersRunning → Draining → Completed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::dedup::seen_filter;
use crate::error::{Error, Result};
use crate::reporter::Reporter;
use crate::types::{Attachment, ChannelFileSet, PipelineState};

use super::FileDownloader;

/// Fires once every worker of a run has exited
///
/// Carries no per-item results; those go to the [`Reporter`]. Clones observe
/// the same run.
#[derive(Clone, Debug)]
pub struct Completion {
    state: watch::Receiver<PipelineState>,
}

impl Completion {
    /// A run that had nothing to do
    fn finished() -> Self {
        let (_state_tx, state) = watch::channel(PipelineState::Completed);
        Self { state }
    }

    /// Current state of the run
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Whether every worker has exited
    pub fn is_complete(&self) -> bool {
        self.state() == PipelineState::Completed
    }

    /// Wait until every worker has exited
    pub async fn wait(mut self) {
        if self
            .state
            .wait_for(|state| *state == PipelineState::Completed)
            .await
            .is_err()
        {
            // The sentinel only goes away without reporting if it panicked;
            // the run is over either way.
            tracing::warn!("Download pipeline ended without reporting completion");
        }
    }
}

impl FileDownloader {
    /// Start downloading `attachments` into `dir`
    ///
    /// Creates `dir` if needed, then spawns the dedup stage and the configured
    /// number of workers and returns immediately. Only a directory that cannot
    /// be created is reported as an error; per-attachment failures go to the
    /// reporter and never stop the run.
    ///
    /// When downloads are disabled the input is dropped untouched, nothing is
    /// written and the returned [`Completion`] has already fired.
    ///
    /// Cancelling `cancel` aborts in-flight transfers and makes every worker
    /// exit without taking further items; the completion still fires.
    pub async fn start<S>(
        &self,
        dir: impl Into<PathBuf>,
        attachments: S,
        cancel: CancellationToken,
    ) -> Result<Completion>
    where
        S: Stream<Item = Attachment> + Send + 'static,
    {
        self.start_with_reporter(dir.into(), attachments, cancel, Arc::clone(&self.reporter))
            .await
    }

    /// Download a channel's attachments into `dir` and wait for the run
    pub async fn download_channel(
        &self,
        dir: impl Into<PathBuf>,
        files: ChannelFileSet,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.start(dir, files.into_stream(), cancel).await?.wait().await;
        Ok(())
    }

    pub(super) async fn start_with_reporter<S>(
        &self,
        dir: PathBuf,
        attachments: S,
        cancel: CancellationToken,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Completion>
    where
        S: Stream<Item = Attachment> + Send + 'static,
    {
        if !self.config.enabled {
            tracing::debug!(dir = %dir.display(), "File downloads disabled, nothing to do");
            return Ok(Completion::finished());
        }

        let (state_tx, state_rx) = watch::channel(PipelineState::Created);

        ensure_dir(&dir).await?;
        state_tx.send_replace(PipelineState::DirectoryReady);

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let queue = Arc::new(Mutex::new(queue_rx));
        let dir = Arc::new(dir);

        let dedup = tokio::spawn({
            let reporter = Arc::clone(&reporter);
            let cancel = cancel.clone();
            async move { seen_filter(attachments, queue_tx, reporter.as_ref(), &cancel).await }
        });

        let workers_count = self.config.workers.max(1);
        let mut workers = JoinSet::new();
        for worker in 0..workers_count {
            workers.spawn(self.clone().run_worker(
                worker,
                Arc::clone(&dir),
                Arc::clone(&queue),
                Arc::clone(&reporter),
                cancel.clone(),
            ));
        }
        drop(queue);
        state_tx.send_replace(PipelineState::WorkersRunning);
        tracing::info!(dir = %dir.display(), workers = workers_count, "File download pipeline started");

        // sentinel
        tokio::spawn(async move {
            match dedup.await {
                Ok(admitted) => tracing::debug!(admitted, "Download queue closed"),
                Err(e) => tracing::error!(error = %e, "Dedup stage failed"),
            }
            state_tx.send_replace(PipelineState::Draining);

            let mut processed = 0;
            while let Some(result) = workers.join_next().await {
                match result {
                    Ok(n) => processed += n,
                    Err(e) => tracing::error!(error = %e, "Download worker failed"),
                }
            }

            state_tx.send_replace(PipelineState::Completed);
            tracing::info!(dir = %dir.display(), processed, "File download pipeline completed");
        });

        Ok(Completion { state: state_rx })
    }
}

/// Create `dir` (and parents); an existing entry is fine
async fn ensure_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);

    match builder.create(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => {
            tracing::error!(dir = %dir.display(), error = %source, "Failed to create download directory");
            Err(Error::CreateDir {
                path: dir.to_path_buf(),
                source,
            })
        }
    }
}
