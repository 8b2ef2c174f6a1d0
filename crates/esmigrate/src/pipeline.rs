//! Migration pipeline orchestration.
//!
//! ```text
//!  source ──scroll──► PageProducer ──bounded queue──► BatchWriter × N ──bulk──► target
//! ```
//!
//! Writers are started before the producer. When the producer is done the
//! queue sender is dropped, which lets every writer drain, flush once more and
//! exit. The coordinator returns after all of them have.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::producer::{PageProducer, StreamEnd};
use crate::retry::RetryConfig;
use crate::writer::{BatchWriterPool, SharedQueue};

/// Best-effort counters shared between the pipeline and whoever reports progress.
///
/// Values are not synchronized with each other; they are only meant for display.
#[derive(Debug, Default)]
pub struct PipelineProgress {
    total_hits: AtomicU64,
    read: AtomicU64,
    written: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    batches: AtomicU64,
}

/// Point-in-time copy of [`PipelineProgress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Hit count announced when the scroll opened.
    pub total_hits: u64,
    /// Documents published to the queue.
    pub read: u64,
    /// Documents acknowledged by the target.
    pub written: u64,
    /// Documents dropped by validation.
    pub rejected: u64,
    /// Documents lost to failed writes.
    pub failed: u64,
    /// Bulk requests sent.
    pub batches: u64,
}

impl PipelineProgress {
    pub(crate) fn set_total_hits(&self, n: u64) {
        self.total_hits.store(n, Ordering::Relaxed);
    }

    pub(crate) fn add_read(&self, n: u64) {
        self.read.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_written(&self, n: u64) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_rejected(&self, n: u64) {
        self.rejected.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_hits: self.total_hits.load(Ordering::Relaxed),
            read: self.read.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

/// Migration statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStats {
    /// Hit count announced when the scroll opened.
    pub total_hits: u64,
    /// Documents read from the source.
    pub read: u64,
    /// Documents acknowledged by the target.
    pub written: u64,
    /// Documents dropped by validation.
    pub rejected: u64,
    /// Documents lost to failed writes.
    pub failed: u64,
    /// Bulk requests sent.
    pub batches: u64,
    /// Whether the scroll was read to the end.
    pub stream_end: StreamEnd,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationStats {
    fn from_snapshot(snapshot: ProgressSnapshot, stream_end: StreamEnd, duration: Duration) -> Self {
        Self {
            total_hits: snapshot.total_hits,
            read: snapshot.read,
            written: snapshot.written,
            rejected: snapshot.rejected,
            failed: snapshot.failed,
            batches: snapshot.batches,
            stream_end,
            duration_secs: duration.as_secs_f64(),
        }
    }

    /// Calculate throughput (documents written per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.written as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// True if the stream completed and nothing was rejected or failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.stream_end.is_complete() && self.rejected == 0 && self.failed == 0
    }
}

/// How often the progress line is logged.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Wires the producer, the queue and the writer pool together.
pub struct PipelineCoordinator {
    source: Arc<dyn ClusterApi>,
    target: Arc<dyn ClusterApi>,
    config: PipelineConfig,
    retry: Option<RetryConfig>,
    progress: Arc<PipelineProgress>,
}

impl PipelineCoordinator {
    /// Creates a coordinator streaming from `source` into `target`.
    pub fn new(
        source: Arc<dyn ClusterApi>,
        target: Arc<dyn ClusterApi>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
            retry: None,
            progress: Arc::new(PipelineProgress::default()),
        }
    }

    /// Overrides the retry policy of both scroll continuation and bulk writes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Shared progress counters; safe to poll while [`Self::run`] is in flight.
    #[must_use]
    pub fn progress(&self) -> Arc<PipelineProgress> {
        self.progress.clone()
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Failing to open the scroll, a write failure under the fail-fast
    /// policy, or cancellation.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<MigrationStats> {
        let started = Instant::now();
        let pipeline_cancel = cancel.child_token();

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity());
        let queue: SharedQueue = Arc::new(Mutex::new(receiver));

        let mut pool = BatchWriterPool::new(self.target.clone(), &self.config, self.progress.clone());
        let mut producer = PageProducer::new(self.source.clone(), &self.config, self.progress.clone());
        if let Some(retry) = &self.retry {
            pool = pool.with_retry(retry.clone());
            producer = producer.with_retry(retry.clone());
        }

        info!(
            workers = self.config.workers,
            queue = self.config.queue_capacity(),
            batch_bytes = self.config.batch_bytes,
            "starting pipeline"
        );
        let writers = pool.spawn(&queue, &pipeline_cancel);
        drop(queue);

        let reporter = self.spawn_reporter(pipeline_cancel.child_token());
        let produced = producer.run(sender, pipeline_cancel.clone()).await;
        let finished = futures::future::join_all(writers).await;
        reporter.cancel();

        let mut writer_error = None;
        for result in finished {
            let err = match result {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e,
                Err(join) => Error::WriteFailed(format!("writer task failed: {}", join)),
            };
            if writer_error.is_none() || matches!(writer_error, Some(Error::Cancelled)) {
                writer_error = Some(err);
            }
        }

        let stream_end = match (produced, writer_error) {
            (_, Some(e)) if !matches!(e, Error::Cancelled) => return Err(e),
            (Err(e), _) => return Err(e),
            (Ok(_), Some(e)) => return Err(e),
            (Ok(end), None) => end,
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let stats =
            MigrationStats::from_snapshot(self.progress.snapshot(), stream_end, started.elapsed());
        if let StreamEnd::Aborted(reason) = &stats.stream_end {
            warn!("scroll ended early, target may be incomplete: {}", reason);
        }
        info!(
            "Pipeline complete: {} read, {} written, {} rejected, {} failed in {:.2}s ({:.0} docs/sec)",
            stats.read,
            stats.written,
            stats.rejected,
            stats.failed,
            stats.duration_secs,
            stats.throughput()
        );
        Ok(stats)
    }

    fn spawn_reporter(&self, stop: CancellationToken) -> CancellationToken {
        let progress = self.progress.clone();
        let handle = stop.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let p = progress.snapshot();
                        info!(
                            read = p.read,
                            written = p.written,
                            total = p.total_hits,
                            batches = p.batches,
                            "progress"
                        );
                    }
                }
            }
        });
        handle
    }
}
