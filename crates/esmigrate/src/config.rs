//! Configuration types for esmigrate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::cluster::HttpTimeouts;
use crate::error::{Error, Result};

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Cluster documents are read from.
    pub source: EndpointConfig,
    /// Cluster documents are written to.
    pub target: EndpointConfig,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Connection settings for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL (e.g., http://localhost:9200).
    pub url: String,
    /// Optional username for Basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for Basic auth.
    #[serde(default)]
    pub password: Option<String>,
}

impl EndpointConfig {
    /// Unauthenticated endpoint at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Sets Basic auth credentials from a `user:pass` string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the string has no `:` separator.
    pub fn with_auth(mut self, auth: &str) -> Result<Self> {
        let (user, pass) = auth
            .split_once(':')
            .ok_or_else(|| Error::Config("auth must be formatted as user:pass".to_string()))?;
        self.username = Some(user.to_string());
        self.password = Some(pass.to_string());
        Ok(self)
    }
}

/// What to do when a bulk write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteFailurePolicy {
    /// Log, count the batch as failed and keep draining.
    #[default]
    BestEffort,
    /// Cancel the migration on the first failed batch.
    FailFast,
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Source index names: comma-separated list, wildcard pattern or `_all`.
    #[serde(default = "default_indices")]
    pub indices: String,
    /// Single target index every document is written to (keeps source names if unset).
    #[serde(default)]
    pub target_index: Option<String>,
    /// Documents per scroll page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Scroll keep-alive, in cluster time-unit syntax.
    #[serde(default = "default_scroll_ttl")]
    pub scroll_ttl: String,
    /// Number of concurrent bulk writers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bulk request size threshold in MB (1 MB = 1,000,000 bytes).
    #[serde(default = "default_bulk_size_mb")]
    pub bulk_size_mb: usize,
    /// Copy index settings to the target before streaming.
    #[serde(default)]
    pub copy_settings: bool,
    /// Copy index mappings to the target before streaming.
    #[serde(default)]
    pub copy_mappings: bool,
    /// Delete target indices before recreating them.
    #[serde(default)]
    pub force: bool,
    /// Include indices whose names start with `.` or `_`.
    #[serde(default)]
    pub copy_all_indices: bool,
    /// Override the number of shards of recreated indices.
    #[serde(default)]
    pub shards: Option<u32>,
    /// Require green (not just yellow) before starting.
    #[serde(default)]
    pub wait_for_green: bool,
    /// Bulk write failure handling.
    #[serde(default)]
    pub write_failure_policy: WriteFailurePolicy,
    /// Retries for transient scroll/bulk failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Whole-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Delay between health polls in seconds.
    #[serde(default = "default_readiness_interval")]
    pub readiness_interval_secs: u64,
    /// Give up waiting for health after this many seconds (0 = wait forever).
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            indices: default_indices(),
            target_index: None,
            page_size: default_page_size(),
            scroll_ttl: default_scroll_ttl(),
            workers: default_workers(),
            bulk_size_mb: default_bulk_size_mb(),
            copy_settings: false,
            copy_mappings: false,
            force: false,
            copy_all_indices: false,
            shards: None,
            wait_for_green: false,
            write_failure_policy: WriteFailurePolicy::default(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            readiness_interval_secs: default_readiness_interval(),
            readiness_timeout_secs: default_readiness_timeout(),
        }
    }
}

fn default_indices() -> String {
    "_all".to_string()
}

fn default_page_size() -> usize {
    5000
}

fn default_scroll_ttl() -> String {
    "1m".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_bulk_size_mb() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_readiness_interval() -> u64 {
    3
}

fn default_readiness_timeout() -> u64 {
    600
}

impl MigrationOptions {
    /// HTTP timeouts applied to both endpoints.
    #[must_use]
    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            request: Duration::from_secs(self.request_timeout_secs),
            connect: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    /// Delay between health polls.
    #[must_use]
    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    /// Readiness deadline; `None` means wait forever.
    #[must_use]
    pub fn readiness_deadline(&self) -> Option<Duration> {
        (self.readiness_timeout_secs > 0).then(|| Duration::from_secs(self.readiness_timeout_secs))
    }
}

/// The subset of options the streaming pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Index list or pattern handed to the scroll.
    pub index_pattern: String,
    /// Scroll keep-alive.
    pub scroll_ttl: String,
    /// Documents per page.
    pub page_size: usize,
    /// Concurrent bulk writers.
    pub workers: usize,
    /// Byte threshold for one bulk request.
    pub batch_bytes: usize,
    /// Optional single target index.
    pub target_index: Option<String>,
    /// Bulk write failure handling.
    pub write_policy: WriteFailurePolicy,
    /// Retries for transient scroll/bulk failures.
    pub max_retries: u32,
}

/// Queue slots per page per worker.
const QUEUE_PAGES_PER_WORKER: usize = 10;

/// `bulk_size_mb` unit.
const BYTES_PER_MB: usize = 1_000_000;

fn batch_bytes(bulk_size_mb: usize) -> Option<usize> {
    bulk_size_mb.checked_mul(BYTES_PER_MB)
}

fn queue_capacity(page_size: usize, workers: usize) -> Option<usize> {
    page_size
        .checked_mul(workers)?
        .checked_mul(QUEUE_PAGES_PER_WORKER)
}

impl PipelineConfig {
    /// Builds the pipeline configuration from the user-facing options.
    #[must_use]
    pub fn from_options(options: &MigrationOptions) -> Self {
        Self {
            index_pattern: options.indices.clone(),
            scroll_ttl: options.scroll_ttl.clone(),
            page_size: options.page_size,
            workers: options.workers,
            batch_bytes: batch_bytes(options.bulk_size_mb).unwrap_or(usize::MAX),
            target_index: options.target_index.clone(),
            write_policy: options.write_failure_policy,
            max_retries: options.max_retries,
        }
    }

    /// Capacity of the hand-off queue: one full page burst per worker, ten times over.
    ///
    /// Clamped to what a tokio channel accepts.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        queue_capacity(self.page_size, self.workers)
            .unwrap_or(usize::MAX)
            .clamp(1, Semaphore::MAX_PERMITS)
    }
}

/// Annotated configuration written by `esmigrate init`.
pub const CONFIG_TEMPLATE: &str = r#"# esmigrate configuration
source:
  url: http://localhost:9200
  # username: elastic
  # password: changeme

target:
  url: http://localhost:9201

options:
  indices: _all            # comma-separated list, wildcard pattern or _all
  # target_index: merged   # write every document to this single index
  page_size: 5000
  scroll_ttl: 1m
  workers: 1
  bulk_size_mb: 5
  copy_settings: false
  copy_mappings: false
  force: false             # delete target indices before recreating them
  copy_all_indices: false  # include indices starting with . or _
  # shards: 5
  wait_for_green: false
  write_failure_policy: best_effort  # best_effort or fail_fast
  max_retries: 3
  request_timeout_secs: 60
  connect_timeout_secs: 10
  readiness_interval_secs: 3
  readiness_timeout_secs: 600        # 0 waits forever
"#;

/// Validates that a URL uses http or https.
pub fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }
    if url.len() < "http://x".len() {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }
    Ok(())
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.source.url)?;
        validate_url(&self.target.url)?;

        let options = &self.options;
        if options.page_size == 0 {
            return Err(Error::Config("page_size must be greater than 0".to_string()));
        }
        if options.workers == 0 {
            return Err(Error::Config("workers must be greater than 0".to_string()));
        }
        if options.bulk_size_mb == 0 {
            return Err(Error::Config(
                "bulk_size_mb must be greater than 0".to_string(),
            ));
        }
        if batch_bytes(options.bulk_size_mb).is_none() {
            return Err(Error::Config(format!(
                "bulk_size_mb is too large: {}",
                options.bulk_size_mb
            )));
        }
        if queue_capacity(options.page_size, options.workers).is_none() {
            return Err(Error::Config(format!(
                "page_size * workers is too large: {} * {}",
                options.page_size, options.workers
            )));
        }
        if options.scroll_ttl.trim().is_empty() {
            return Err(Error::Config("scroll_ttl cannot be empty".to_string()));
        }
        if options.indices.trim().is_empty() {
            return Err(Error::Config("indices cannot be empty".to_string()));
        }
        if let Some(target) = &options.target_index {
            if target.is_empty() || target.contains(',') || target.contains('*') {
                return Err(Error::Config(format!(
                    "target_index must name a single index, got '{}'",
                    target
                )));
            }
        }
        if options.readiness_interval_secs == 0 {
            return Err(Error::Config(
                "readiness_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
