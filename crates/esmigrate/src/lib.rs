// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # esmigrate
//!
//! `esmigrate` is a CLI tool and library for streaming documents between
//! Elasticsearch clusters, including clusters of different protocol
//! generations.
//!
//! ## Supported Clusters
//!
//! | Version | Dialect | Scroll open |
//! |---------|---------|-------------|
//! | 0.90 - 2.x | legacy | `search_type=scan` |
//! | 5.x | current | plain scroll |
//!
//! Both dialects continue a scroll with
//! `GET /_search/scroll?scroll={ttl}&scroll_id={cursor}`. The dialect of each
//! endpoint is probed once at startup; source and target may speak different
//! dialects.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a config template
//! esmigrate init --output migration.yaml
//!
//! # Migrate
//! esmigrate run --config migration.yaml --workers 4
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   url: http://old-cluster:9200
//!
//! target:
//!   url: http://new-cluster:9200
//!   username: elastic
//!   password: changeme
//!
//! options:
//!   indices: "logs-*"
//!   page_size: 5000
//!   workers: 4
//!   bulk_size_mb: 5
//!   copy_mappings: true
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod indices;
pub mod migration;
pub mod model;
pub mod pipeline;
pub mod producer;
pub mod readiness;
pub mod retry;
pub mod writer;

#[cfg(test)]
mod testing;

pub use cluster::{probe, BulkOutcome, ClusterApi, CurrentApi, Dialect, Endpoint, LegacyApi};
pub use config::{EndpointConfig, MigrationConfig, MigrationOptions, PipelineConfig, WriteFailurePolicy};
pub use error::{Error, Result};
pub use migration::Migration;
pub use model::{ClusterHealth, Cursor, Document, HealthStatus, Page};
pub use pipeline::{MigrationStats, PipelineCoordinator, PipelineProgress};
pub use producer::{PageProducer, StreamEnd};
pub use readiness::ReadinessGate;
pub use writer::BatchWriterPool;
