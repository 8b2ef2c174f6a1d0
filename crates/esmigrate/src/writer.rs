//! Pool of bulk writers draining the hand-off queue.
//!
//! Each writer owns one [`Batch`]. Before a document is appended the writer
//! checks whether the batch would cross the byte threshold and, if so, flushes
//! first. A flushed batch is therefore never larger than the threshold, unless
//! a single document is larger on its own, in which case it is sent alone.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::ClusterApi;
use crate::config::{PipelineConfig, WriteFailurePolicy};
use crate::error::{Error, Result};
use crate::model::Document;
use crate::pipeline::PipelineProgress;
use crate::retry::{with_retry, RetryConfig};

/// Receiving end of the hand-off queue, shared by every writer.
pub type SharedQueue = Arc<Mutex<mpsc::Receiver<Document>>>;

/// Accumulating bulk body owned by a single writer.
#[derive(Debug, Default)]
pub struct Batch {
    buf: Vec<u8>,
    docs: usize,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when no document has been appended since the last flush.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs == 0
    }

    /// Number of documents in the batch.
    #[must_use]
    pub fn docs(&self) -> usize {
        self.docs
    }

    /// True if appending `extra` bytes would cross `threshold`.
    #[must_use]
    pub fn would_exceed(&self, extra: usize, threshold: usize) -> bool {
        self.buf.len() + extra > threshold
    }

    /// Appends one encoded document.
    pub fn append(&mut self, encoded: &[u8]) {
        self.buf.extend_from_slice(encoded);
        self.docs += 1;
    }

    /// Takes the body and document count, leaving the batch empty.
    pub fn take(&mut self) -> (Vec<u8>, usize) {
        let docs = std::mem::take(&mut self.docs);
        (std::mem::take(&mut self.buf), docs)
    }
}

/// Per-writer totals, returned when a writer finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    /// Documents acknowledged by the target.
    pub written: u64,
    /// Documents dropped by validation.
    pub rejected: u64,
    /// Documents in failed batches or failed bulk items.
    pub failed: u64,
    /// Bulk requests sent.
    pub batches: u64,
}

/// Fixed-size pool of bulk writers.
pub struct BatchWriterPool {
    api: Arc<dyn ClusterApi>,
    workers: usize,
    threshold: usize,
    target_index: Option<String>,
    policy: WriteFailurePolicy,
    retry: RetryConfig,
    progress: Arc<PipelineProgress>,
}

impl BatchWriterPool {
    /// Creates a pool writing to `api` with the sizing from `config`.
    pub fn new(
        api: Arc<dyn ClusterApi>,
        config: &PipelineConfig,
        progress: Arc<PipelineProgress>,
    ) -> Self {
        Self {
            api,
            workers: config.workers.max(1),
            threshold: config.batch_bytes,
            target_index: config.target_index.clone(),
            policy: config.write_policy,
            retry: RetryConfig::with_max_retries(config.max_retries),
            progress,
        }
    }

    /// Overrides the retry policy for bulk writes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Spawns every writer on the runtime.
    ///
    /// Writers run until the queue is closed and drained, or `cancel` fires.
    pub fn spawn(
        &self,
        queue: &SharedQueue,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<Result<WriterReport>>> {
        (0..self.workers)
            .map(|id| {
                let writer = BatchWriter {
                    id,
                    api: self.api.clone(),
                    threshold: self.threshold,
                    target_index: self.target_index.clone(),
                    policy: self.policy,
                    retry: self.retry.clone(),
                    progress: self.progress.clone(),
                    cancel: cancel.clone(),
                    report: WriterReport::default(),
                };
                tokio::spawn(writer.run(queue.clone()))
            })
            .collect()
    }
}

struct BatchWriter {
    id: usize,
    api: Arc<dyn ClusterApi>,
    threshold: usize,
    target_index: Option<String>,
    policy: WriteFailurePolicy,
    retry: RetryConfig,
    progress: Arc<PipelineProgress>,
    cancel: CancellationToken,
    report: WriterReport,
}

impl BatchWriter {
    async fn run(mut self, queue: SharedQueue) -> Result<WriterReport> {
        let mut batch = Batch::new();
        let mut encoded = Vec::new();

        while let Some(mut doc) = self.next(&queue).await? {
            if let Err(e) = doc.validate() {
                warn!(worker = self.id, "dropping document: {}", e);
                self.report.rejected += 1;
                self.progress.add_rejected(1);
                continue;
            }
            if let Some(target) = &self.target_index {
                doc.index.clone_from(target);
            }

            encoded.clear();
            if let Err(e) = doc.encode_bulk(&mut encoded) {
                warn!(worker = self.id, id = %doc.id, "cannot encode document: {}", e);
                self.report.rejected += 1;
                self.progress.add_rejected(1);
                continue;
            }

            if !batch.is_empty() && batch.would_exceed(encoded.len(), self.threshold) {
                self.flush(&mut batch).await?;
            }

            if encoded.len() > self.threshold {
                warn!(
                    worker = self.id,
                    id = %doc.id,
                    bytes = encoded.len(),
                    "document exceeds bulk threshold, sending alone"
                );
                let mut alone = Batch::new();
                alone.append(&encoded);
                self.flush(&mut alone).await?;
                continue;
            }

            batch.append(&encoded);
        }

        if !batch.is_empty() {
            self.flush(&mut batch).await?;
        }

        debug!(
            worker = self.id,
            written = self.report.written,
            batches = self.report.batches,
            "writer finished"
        );
        Ok(self.report)
    }

    /// Next document, `None` once the queue is closed and drained.
    async fn next(&self, queue: &SharedQueue) -> Result<Option<Document>> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            doc = async { queue.lock().await.recv().await } => Ok(doc),
        }
    }

    async fn flush(&mut self, batch: &mut Batch) -> Result<()> {
        let (body, docs) = batch.take();
        if docs == 0 {
            return Ok(());
        }
        let bytes = body.len();
        let api = &self.api;
        let send = with_retry(&self.retry, "bulk", move || api.write_batch(body.clone()));
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => return Err(Error::Cancelled),
            outcome = send => outcome,
        };

        self.report.batches += 1;
        self.progress.add_batch();
        let docs = docs as u64;
        match outcome {
            Ok(outcome) => {
                let failed = (outcome.failed as u64).min(docs);
                self.report.written += docs - failed;
                self.report.failed += failed;
                self.progress.add_written(docs - failed);
                self.progress.add_failed(failed);
                debug!(worker = self.id, docs, bytes, failed, "bulk flushed");
                if failed > 0 {
                    warn!(worker = self.id, failed, "bulk request had rejected items");
                    return self.on_failure(format!("{} of {} items rejected", failed, docs));
                }
                Ok(())
            }
            Err(e) => {
                self.report.failed += docs;
                self.progress.add_failed(docs);
                error!(worker = self.id, docs, bytes, "bulk request failed: {}", e);
                self.on_failure(e.to_string())
            }
        }
    }

    fn on_failure(&self, reason: String) -> Result<()> {
        match self.policy {
            WriteFailurePolicy::BestEffort => Ok(()),
            WriteFailurePolicy::FailFast => {
                info!(worker = self.id, "fail-fast policy, cancelling migration");
                self.cancel.cancel();
                Err(Error::WriteFailed(reason))
            }
        }
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
