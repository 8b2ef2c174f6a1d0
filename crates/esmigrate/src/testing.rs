//! In-memory [`ClusterApi`] used by unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::cluster::{BulkOutcome, ClusterApi, Dialect, IndexMap};
use crate::error::{Error, Result};
use crate::model::{ClusterHealth, Cursor, Document, HealthStatus, Page};

#[derive(Default)]
struct State {
    health: VecDeque<HealthStatus>,
    health_calls: usize,
    pages: VecDeque<Page>,
    continue_calls: usize,
    fail_scroll: bool,
    open_error: bool,
    write_error: bool,
    item_failures: bool,
    batches: Vec<Vec<u8>>,
    settings: IndexMap,
    mappings: IndexMap,
    existing: HashSet<String>,
    created: Vec<(String, Value)>,
    updated: Vec<(String, Value)>,
    deleted: Vec<String>,
}

pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn with(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// Statuses returned in order; the last one repeats.
    pub(crate) fn with_health(self, statuses: Vec<HealthStatus>) -> Self {
        self.with(|s| s.health = statuses.into())
    }

    /// First page answers the open, the rest answer continuations.
    pub(crate) fn with_pages(self, pages: Vec<Page>) -> Self {
        self.with(|s| s.pages = pages.into())
    }

    /// Continuations fail once the configured pages are used up.
    pub(crate) fn then_fail_scroll(self) -> Self {
        self.with(|s| s.fail_scroll = true)
    }

    pub(crate) fn with_open_error(self) -> Self {
        self.with(|s| s.open_error = true)
    }

    /// Every bulk request fails with a non-retryable error.
    pub(crate) fn with_write_error(self) -> Self {
        self.with(|s| s.write_error = true)
    }

    /// Every bulk request succeeds but reports all items as failed.
    pub(crate) fn with_item_failures(self) -> Self {
        self.with(|s| s.item_failures = true)
    }

    pub(crate) fn with_settings(self, settings: Value) -> Self {
        self.with(|s| s.settings = as_map(settings))
    }

    pub(crate) fn with_mappings(self, mappings: Value) -> Self {
        self.with(|s| s.mappings = as_map(mappings))
    }

    /// Indices that already exist; creating them fails until deleted.
    pub(crate) fn with_existing(self, names: &[&str]) -> Self {
        self.with(|s| s.existing = names.iter().map(|n| (*n).to_string()).collect())
    }

    pub(crate) fn health_calls(&self) -> usize {
        self.state.lock().unwrap().health_calls
    }

    pub(crate) fn continue_calls(&self) -> usize {
        self.state.lock().unwrap().continue_calls
    }

    pub(crate) fn batches(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().batches.clone()
    }

    /// Documents per bulk request, in send order.
    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(|b| bulk_headers(b).len()).collect()
    }

    /// `create` headers of every bulk request sent.
    pub(crate) fn written(&self) -> Vec<Value> {
        self.batches().iter().flat_map(|b| bulk_headers(b)).collect()
    }

    pub(crate) fn created(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().created.clone()
    }

    pub(crate) fn updated(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().updated.clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

fn as_map(value: Value) -> IndexMap {
    match value {
        Value::Object(map) => map,
        _ => IndexMap::new(),
    }
}

fn bulk_headers(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .step_by(2)
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["create"].clone())
        .collect()
}

fn next_page(state: &mut State) -> Result<Page> {
    match state.pages.pop_front() {
        Some(page) => Ok(page),
        None if state.fail_scroll => Err(Error::Transport("connection reset".to_string())),
        None => Ok(Page::default()),
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    fn host(&self) -> &str {
        "fake"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Current
    }

    async fn health(&self) -> ClusterHealth {
        let mut s = self.state.lock().unwrap();
        s.health_calls += 1;
        let status = if s.health.len() > 1 {
            s.health.pop_front()
        } else {
            s.health.front().copied()
        };
        ClusterHealth {
            name: "fake".to_string(),
            status: status.unwrap_or(HealthStatus::Green),
        }
    }

    async fn open_cursor(&self, _: &str, _: &str, _: usize) -> Result<(Page, Cursor)> {
        let mut s = self.state.lock().unwrap();
        if s.open_error {
            return Err(Error::Protocol {
                status: 404,
                body: "index_not_found_exception".to_string(),
            });
        }
        let page = next_page(&mut s)?;
        Ok((page, Cursor::new("c0")))
    }

    async fn continue_cursor(&self, _: &str, _: &Cursor) -> Result<(Page, Cursor)> {
        let mut s = self.state.lock().unwrap();
        s.continue_calls += 1;
        let page = next_page(&mut s)?;
        let cursor = Cursor::new(format!("c{}", s.continue_calls));
        Ok((page, cursor))
    }

    async fn write_batch(&self, body: Vec<u8>) -> Result<BulkOutcome> {
        if body.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let mut s = self.state.lock().unwrap();
        if s.write_error {
            return Err(Error::Protocol {
                status: 400,
                body: "mapper_parsing_exception".to_string(),
            });
        }
        let items = bulk_headers(&body).len();
        s.batches.push(body);
        Ok(BulkOutcome {
            items,
            failed: if s.item_failures { items } else { 0 },
        })
    }

    async fn read_settings(&self, _: &str) -> Result<IndexMap> {
        Ok(self.state.lock().unwrap().settings.clone())
    }

    async fn read_mappings(&self, _: &str) -> Result<IndexMap> {
        Ok(self.state.lock().unwrap().mappings.clone())
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if s.existing.contains(name) {
            return Err(Error::Protocol {
                status: 400,
                body: json!({"error": {"type": "index_already_exists_exception"}}).to_string(),
            });
        }
        s.existing.insert(name.to_string());
        s.created.push((name.to_string(), body.clone()));
        Ok(())
    }

    async fn update_settings(&self, name: &str, settings: &Value) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .updated
            .push((name.to_string(), settings.clone()));
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.existing.remove(name);
        s.deleted.push(name.to_string());
        Ok(())
    }
}

/// `n` small documents in `index` with ids `start..start + n`.
pub(crate) fn documents(index: &str, start: usize, n: usize) -> Vec<Document> {
    (start..start + n)
        .map(|i| Document::new(index, "doc", i.to_string(), json!({"n": i, "body": "x"})))
        .collect()
}

pub(crate) fn page(documents: Vec<Document>) -> Page {
    Page {
        total_hits: documents.len() as u64,
        documents,
        shard_failures: Vec::new(),
    }
}
