//! Scroll-driven page producer feeding the hand-off queue.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::ClusterApi;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::model::{Cursor, Document, Page};
use crate::pipeline::PipelineProgress;
use crate::retry::{with_retry, RetryConfig};

/// How the document stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// A continuation returned an empty page.
    Completed,
    /// A continuation failed; streaming stopped early with this reason.
    Aborted(String),
}

impl StreamEnd {
    /// True if every page was read.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

enum State {
    Opening,
    Streaming(Cursor),
    Done(StreamEnd),
}

/// Reads the source through a scroll and publishes each document.
pub struct PageProducer {
    api: Arc<dyn ClusterApi>,
    index_pattern: String,
    ttl: String,
    page_size: usize,
    retry: RetryConfig,
    progress: Arc<PipelineProgress>,
}

impl PageProducer {
    /// Creates a producer reading `config.index_pattern` from `api`.
    pub fn new(
        api: Arc<dyn ClusterApi>,
        config: &PipelineConfig,
        progress: Arc<PipelineProgress>,
    ) -> Self {
        Self {
            api,
            index_pattern: config.index_pattern.clone(),
            ttl: config.scroll_ttl.clone(),
            page_size: config.page_size,
            retry: RetryConfig::with_max_retries(config.max_retries),
            progress,
        }
    }

    /// Overrides the retry policy for continuations.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Drives the scroll to the end, publishing every document to `queue`.
    ///
    /// The queue is closed when this returns (the sender is dropped).
    ///
    /// # Errors
    ///
    /// Failing to open the scroll is fatal and returned. A failing
    /// continuation is logged and reported as [`StreamEnd::Aborted`].
    /// [`Error::Cancelled`] if `cancel` fires.
    pub async fn run(
        self,
        queue: mpsc::Sender<Document>,
        cancel: CancellationToken,
    ) -> Result<StreamEnd> {
        let mut state = State::Opening;
        loop {
            state = match state {
                State::Opening => {
                    let (page, cursor) = tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        opened = self.api.open_cursor(&self.index_pattern, &self.ttl, self.page_size) => opened?,
                    };
                    self.progress.set_total_hits(page.total_hits);
                    info!(
                        host = self.api.host(),
                        pattern = %self.index_pattern,
                        total_hits = page.total_hits,
                        "scroll opened"
                    );
                    self.publish(page, &queue, &cancel).await?;
                    State::Streaming(cursor)
                }
                State::Streaming(cursor) => {
                    let next = tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        next = self.next_page(&cursor) => next,
                    };
                    match next {
                        Ok((page, _)) if page.is_empty() => {
                            debug!("scroll result is empty");
                            State::Done(StreamEnd::Completed)
                        }
                        Ok((page, cursor)) => {
                            self.publish(page, &queue, &cancel).await?;
                            State::Streaming(cursor)
                        }
                        Err(e) => {
                            warn!(host = self.api.host(), "scroll aborted: {}", e);
                            State::Done(StreamEnd::Aborted(e.to_string()))
                        }
                    }
                }
                State::Done(end) => return Ok(end),
            };
        }
    }

    async fn next_page(&self, cursor: &Cursor) -> Result<(Page, Cursor)> {
        let api = &self.api;
        let ttl = self.ttl.as_str();
        with_retry(&self.retry, "scroll", move || api.continue_cursor(ttl, cursor)).await
    }

    async fn publish(
        &self,
        page: Page,
        queue: &mpsc::Sender<Document>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for failure in &page.shard_failures {
            warn!(
                shard = failure.shard,
                index = failure.index.as_deref().unwrap_or("-"),
                "shard failure: {}",
                failure.reason
            );
        }

        let count = page.documents.len();
        for doc in page.documents {
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                sent = queue.send(doc) => sent.map_err(|_| Error::Cancelled)?,
            }
        }
        self.progress.add_read(count as u64);
        Ok(())
    }
}
