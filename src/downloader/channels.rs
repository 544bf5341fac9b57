//! Channel runs: one pipeline per channel, with the fail-on-error policy
//! applied between channels.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::reporter::{DownloadCounter, DownloadStats, Reporter};
use crate::types::{Channel, ChannelFileSet};

use super::FileDownloader;

/// Totals for one channel run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelReport {
    /// Channel identifier
    pub channel_id: String,
    /// Where the channel's files were saved
    pub dir: PathBuf,
    /// Outcome counts of the run
    pub stats: DownloadStats,
}

/// Result of [`FileDownloader::dump_channels`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpSummary {
    /// One entry per channel, in processing order
    pub channels: Vec<ChannelReport>,
}

impl DumpSummary {
    /// Totals across all channels
    pub fn total(&self) -> DownloadStats {
        self.channels
            .iter()
            .fold(DownloadStats::default(), |acc, report| DownloadStats {
                downloaded: acc.downloaded + report.stats.downloaded,
                failed: acc.failed + report.stats.failed,
                skipped: acc.skipped + report.stats.skipped,
                cancelled: acc.cancelled + report.stats.cancelled,
                bytes: acc.bytes + report.stats.bytes,
            })
    }
}

impl FileDownloader {
    /// Directory a channel's files are saved to: `<base>/<channel id>`
    pub fn channel_dir(base: &Path, channel_id: &str) -> PathBuf {
        base.join(channel_id)
    }

    /// Download the attachments of several channels, one channel at a time
    ///
    /// Each channel gets its own run, and therefore its own dedup set. With
    /// `fail_on_error` set, the first channel whose run recorded a failure
    /// ends the dump with [`Error::ChannelFailed`]; that run itself still
    /// drained its whole queue, and later channels are not started.
    pub async fn dump_channels(
        &self,
        base_dir: &Path,
        channels: &[Channel],
        cancel: &CancellationToken,
    ) -> Result<DumpSummary> {
        let mut summary = DumpSummary::default();

        for channel in channels {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let files = ChannelFileSet::from_channel(channel);
            let dir = Self::channel_dir(base_dir, &files.channel_id);
            tracing::info!(
                channel_id = %files.channel_id,
                files = files.files.len(),
                "Downloading channel files"
            );

            let counter = Arc::new(DownloadCounter::new());
            let reporter: Arc<dyn Reporter> =
                Arc::new((Arc::clone(&self.reporter), Arc::clone(&counter)));

            self.start_with_reporter(dir.clone(), files.into_stream(), cancel.clone(), reporter)
                .await?
                .wait()
                .await;

            let stats = counter.snapshot();
            summary.channels.push(ChannelReport {
                channel_id: channel.id.clone(),
                dir,
                stats,
            });

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if self.config.fail_on_error && stats.failed > 0 {
                tracing::warn!(
                    channel_id = %channel.id,
                    failed = stats.failed,
                    "File downloads failed, not processing further channels"
                );
                return Err(Error::ChannelFailed {
                    channel_id: channel.id.clone(),
                    failed: stats.failed,
                });
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(summary)
    }
}
