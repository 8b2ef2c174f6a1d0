//! HTTP plumbing and the dialect-independent cluster operations.

use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cluster::{BulkOutcome, IndexMap};
use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::model::{ClusterHealth, ClusterVersion};

/// Timeouts attached to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Whole-request timeout.
    pub request: Duration,
    /// TCP connect timeout.
    pub connect: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(60),
            connect: Duration::from_secs(10),
        }
    }
}

/// Creates a configured HTTP client with timeouts.
fn create_http_client(timeouts: HttpTimeouts) -> Result<Client> {
    Client::builder()
        .timeout(timeouts.request)
        .connect_timeout(timeouts.connect)
        .build()
        .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))
}

#[derive(Deserialize)]
struct RootResponse {
    version: ClusterVersion,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// One cluster endpoint: base URL, credentials and a pooled HTTP client.
///
/// Holds every operation that is identical across dialects.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: String,
    username: Option<String>,
    password: Option<String>,
    client: Client,
}

impl Endpoint {
    /// Creates an endpoint from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: &EndpointConfig, timeouts: HttpTimeouts) -> Result<Self> {
        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: create_http_client(timeouts)?,
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Builds an authenticated request for `path` (relative to the base URL).
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = if path.is_empty() {
            self.url.clone()
        } else {
            format!("{}/{}", self.url, path.trim_start_matches('/'))
        };
        let req = self.client.request(method, url);
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    /// Sends a request and returns the body of a successful response.
    pub(crate) async fn execute(&self, req: RequestBuilder) -> Result<String> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), body));
        }
        Ok(body)
    }

    /// Queries the root endpoint for the cluster version.
    ///
    /// # Errors
    ///
    /// Transport, protocol or decode errors; an empty version number is a
    /// decode error.
    pub async fn version(&self) -> Result<ClusterVersion> {
        let body = self.execute(self.request(Method::GET, "")).await?;
        debug!(host = %self.url, "version response: {}", body);
        let root: RootResponse = serde_json::from_str(&body)?;
        if root.version.number.is_empty() {
            return Err(Error::Decode(format!(
                "{} reported no version number",
                self.url
            )));
        }
        Ok(root.version)
    }

    /// Queries `/_cluster/health`; failures are folded into `unreachable`.
    pub async fn health(&self) -> ClusterHealth {
        let body = match self
            .execute(self.request(Method::GET, "_cluster/health"))
            .await
        {
            Ok(body) => body,
            Err(e) => {
                debug!(host = %self.url, "health check failed: {}", e);
                return ClusterHealth::unreachable(&self.url);
            }
        };
        match serde_json::from_str::<ClusterHealth>(&body) {
            Ok(health) => health,
            Err(e) => {
                warn!(host = %self.url, "undecodable health response: {}", e);
                ClusterHealth::unreachable(&self.url)
            }
        }
    }

    /// Posts a newline-delimited bulk body to `/_bulk`.
    ///
    /// # Errors
    ///
    /// Transport or protocol errors, or an undecodable bulk response.
    pub async fn bulk(&self, mut body: Vec<u8>) -> Result<BulkOutcome> {
        if body.is_empty() {
            return Ok(BulkOutcome::default());
        }
        if body.last() != Some(&b'\n') {
            body.push(b'\n');
        }
        let req = self
            .request(Method::POST, "_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        let text = self.execute(req).await?;
        let response: BulkResponse = serde_json::from_str(&text)?;

        let failed = if response.errors {
            response
                .items
                .iter()
                .filter(|item| {
                    item.as_object()
                        .and_then(|ops| ops.values().next())
                        .is_some_and(|op| op.get("error").is_some())
                })
                .count()
        } else {
            0
        };
        Ok(BulkOutcome {
            items: response.items.len(),
            failed,
        })
    }

    async fn get_index_map(&self, path: &str) -> Result<IndexMap> {
        let body = self.execute(self.request(Method::GET, path)).await?;
        debug!(host = %self.url, path, "index metadata: {}", body);
        Ok(serde_json::from_str(&body)?)
    }

    /// Reads `/{names}/_settings`.
    ///
    /// # Errors
    ///
    /// Transport, protocol or decode errors.
    pub async fn settings(&self, index_names: &str) -> Result<IndexMap> {
        self.get_index_map(&format!("{}/_settings", index_names))
            .await
    }

    /// Reads `/{names}/_mapping`.
    ///
    /// # Errors
    ///
    /// Transport, protocol or decode errors.
    pub async fn mappings(&self, index_names: &str) -> Result<IndexMap> {
        self.get_index_map(&format!("{}/_mapping", index_names))
            .await
    }

    /// Creates `name` with the given body.
    ///
    /// # Errors
    ///
    /// Transport or protocol errors.
    pub async fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        debug!(host = %self.url, index = name, "creating index");
        self.execute(self.request(Method::PUT, name).json(body))
            .await
            .map(|_| ())
    }

    /// Updates dynamic settings of `name`.
    ///
    /// # Errors
    ///
    /// Transport or protocol errors.
    pub async fn update_settings(&self, name: &str, settings: &Value) -> Result<()> {
        debug!(host = %self.url, index = name, "updating settings");
        self.execute(
            self.request(Method::PUT, &format!("{}/_settings", name))
                .json(settings),
        )
        .await
        .map(|_| ())
    }

    /// Deletes `name`; a 404 is treated as success.
    ///
    /// # Errors
    ///
    /// Transport errors or any non-404 protocol error.
    pub async fn delete_index(&self, name: &str) -> Result<()> {
        match self.execute(self.request(Method::DELETE, name)).await {
            Ok(_) => Ok(()),
            Err(Error::Protocol { status: 404, .. }) => {
                debug!(host = %self.url, index = name, "index did not exist");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
