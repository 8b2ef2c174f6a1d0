//! Cluster capability interface and its two protocol dialects.
//!
//! The pipeline talks to both endpoints through [`ClusterApi`]. Health, bulk
//! and index management are implemented once on [`Endpoint`]; the
//! [`LegacyApi`] and [`CurrentApi`] adapters only differ in how a scroll is
//! opened and continued. [`probe`] picks the adapter once per endpoint.

pub mod current;
pub mod endpoint;
pub mod legacy;
pub mod probe;
mod scroll;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::{ClusterHealth, Cursor, Page};

pub use current::CurrentApi;
pub use endpoint::{Endpoint, HttpTimeouts};
pub use legacy::LegacyApi;
pub use probe::{probe, select_dialect};

/// Index name to settings or mappings object, as returned by the cluster.
pub type IndexMap = Map<String, Value>;

/// Protocol generation spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Pre-5.x clusters: scrolls opened with `search_type=scan`.
    Legacy,
    /// 5.x clusters: plain scrolls.
    Current,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Current => f.write_str("current"),
        }
    }
}

/// Summary of one bulk request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Items acknowledged by the cluster.
    pub items: usize,
    /// Items the cluster reported as failed.
    pub failed: usize,
}

/// Dialect-agnostic operations against one cluster endpoint.
///
/// Implementations must be cheap to share across tasks (`Arc<dyn ClusterApi>`).
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Base URL of the endpoint, used in log lines.
    fn host(&self) -> &str;

    /// Protocol generation of this adapter.
    fn dialect(&self) -> Dialect;

    /// Queries cluster health. Never fails; transport or decode problems
    /// yield [`crate::model::HealthStatus::Unreachable`].
    async fn health(&self) -> ClusterHealth;

    /// Opens a scroll over `index_pattern` and returns the first page.
    ///
    /// The first page may legitimately be empty (scan-type scrolls).
    async fn open_cursor(
        &self,
        index_pattern: &str,
        ttl: &str,
        page_size: usize,
    ) -> Result<(Page, Cursor)>;

    /// Advances the scroll. An empty page means the stream is exhausted.
    /// The returned cursor replaces the one passed in.
    async fn continue_cursor(&self, ttl: &str, cursor: &Cursor) -> Result<(Page, Cursor)>;

    /// Sends one pre-encoded bulk body. Empty input is a no-op.
    async fn write_batch(&self, body: Vec<u8>) -> Result<BulkOutcome>;

    /// Reads settings for a comma-separated list or pattern of indices.
    async fn read_settings(&self, index_names: &str) -> Result<IndexMap>;

    /// Reads mappings for a comma-separated list or pattern of indices.
    async fn read_mappings(&self, index_names: &str) -> Result<IndexMap>;

    /// Creates an index with the given settings/mappings body.
    async fn create_index(&self, name: &str, body: &Value) -> Result<()>;

    /// Updates the dynamic settings of an existing index.
    async fn update_settings(&self, name: &str, settings: &Value) -> Result<()>;

    /// Deletes an index. A missing index is not an error.
    async fn delete_index(&self, name: &str) -> Result<()>;
}
