//! Adapter for 5.x clusters.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::trace;

use crate::cluster::scroll::decode_open;
use crate::cluster::{BulkOutcome, ClusterApi, Dialect, Endpoint, IndexMap, LegacyApi};
use crate::error::Result;
use crate::model::{ClusterHealth, Cursor, Page};

/// Current dialect: plain scrolls, since `search_type=scan` is gone.
///
/// Only opening a scroll differs; everything else, continuation included, is
/// delegated to [`LegacyApi`].
#[derive(Debug, Clone)]
pub struct CurrentApi {
    legacy: LegacyApi,
}

impl CurrentApi {
    /// Wraps an endpoint.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            legacy: LegacyApi::new(endpoint),
        }
    }

    fn endpoint(&self) -> &Endpoint {
        self.legacy.endpoint()
    }
}

#[async_trait]
impl ClusterApi for CurrentApi {
    fn host(&self) -> &str {
        self.legacy.host()
    }

    fn dialect(&self) -> Dialect {
        Dialect::Current
    }

    async fn health(&self) -> ClusterHealth {
        self.legacy.health().await
    }

    async fn open_cursor(
        &self,
        index_pattern: &str,
        ttl: &str,
        page_size: usize,
    ) -> Result<(Page, Cursor)> {
        let size = page_size.to_string();
        let req = self
            .endpoint()
            .request(Method::GET, &format!("{}/_search", index_pattern))
            .query(&[("scroll", ttl), ("size", size.as_str())]);
        let body = self.endpoint().execute(req).await?;
        trace!(host = self.host(), "new scroll: {}", body);
        decode_open(&body)
    }

    async fn continue_cursor(&self, ttl: &str, cursor: &Cursor) -> Result<(Page, Cursor)> {
        self.legacy.continue_cursor(ttl, cursor).await
    }

    async fn write_batch(&self, body: Vec<u8>) -> Result<BulkOutcome> {
        self.legacy.write_batch(body).await
    }

    async fn read_settings(&self, index_names: &str) -> Result<IndexMap> {
        self.legacy.read_settings(index_names).await
    }

    async fn read_mappings(&self, index_names: &str) -> Result<IndexMap> {
        self.legacy.read_mappings(index_names).await
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        self.legacy.create_index(name, body).await
    }

    async fn update_settings(&self, name: &str, settings: &Value) -> Result<()> {
        self.legacy.update_settings(name, settings).await
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        self.legacy.delete_index(name).await
    }
}
