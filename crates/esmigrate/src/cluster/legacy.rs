//! Adapter for pre-5.x clusters.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::trace;

use crate::cluster::scroll::{decode_continue, decode_open};
use crate::cluster::{BulkOutcome, ClusterApi, Dialect, Endpoint, IndexMap};
use crate::error::Result;
use crate::model::{ClusterHealth, Cursor, Page};

/// Legacy dialect: `search_type=scan` scrolls, cursor sent as a query parameter.
///
/// This adapter is the single source of health, bulk and index-management
/// behavior; [`crate::cluster::CurrentApi`] delegates to it for everything but
/// the two cursor calls.
#[derive(Debug, Clone)]
pub struct LegacyApi {
    endpoint: Endpoint,
}

impl LegacyApi {
    /// Wraps an endpoint.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Underlying endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl ClusterApi for LegacyApi {
    fn host(&self) -> &str {
        self.endpoint.url()
    }

    fn dialect(&self) -> Dialect {
        Dialect::Legacy
    }

    async fn health(&self) -> ClusterHealth {
        self.endpoint.health().await
    }

    async fn open_cursor(
        &self,
        index_pattern: &str,
        ttl: &str,
        page_size: usize,
    ) -> Result<(Page, Cursor)> {
        let size = page_size.to_string();
        let req = self
            .endpoint
            .request(Method::GET, &format!("{}/_search", index_pattern))
            .query(&[
                ("search_type", "scan"),
                ("scroll", ttl),
                ("size", size.as_str()),
            ]);
        let body = self.endpoint.execute(req).await?;
        trace!(host = self.host(), "new scroll: {}", body);
        decode_open(&body)
    }

    async fn continue_cursor(&self, ttl: &str, cursor: &Cursor) -> Result<(Page, Cursor)> {
        let req = self
            .endpoint
            .request(Method::GET, "_search/scroll")
            .query(&[("scroll", ttl), ("scroll_id", cursor.id.as_str())]);
        let body = self.endpoint.execute(req).await?;
        decode_continue(&body, cursor)
    }

    async fn write_batch(&self, body: Vec<u8>) -> Result<BulkOutcome> {
        self.endpoint.bulk(body).await
    }

    async fn read_settings(&self, index_names: &str) -> Result<IndexMap> {
        self.endpoint.settings(index_names).await
    }

    async fn read_mappings(&self, index_names: &str) -> Result<IndexMap> {
        self.endpoint.mappings(index_names).await
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        self.endpoint.create_index(name, body).await
    }

    async fn update_settings(&self, name: &str, settings: &Value) -> Result<()> {
        self.endpoint.update_settings(name, settings).await
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        self.endpoint.delete_index(name).await
    }
}
