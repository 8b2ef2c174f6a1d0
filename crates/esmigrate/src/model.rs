//! Dialect-agnostic data model shared by the cluster adapters and the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A single document read from the source cluster.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Document {
    /// Index the document lives in (or is written to, after renaming).
    #[serde(rename = "_index", default)]
    pub index: String,
    /// Mapping type.
    #[serde(rename = "_type", default)]
    pub doc_type: String,
    /// Document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Raw `_source` object.
    #[serde(rename = "_source", default)]
    pub source: Value,
}

#[derive(Serialize)]
struct BulkAction<'a> {
    create: BulkHeader<'a>,
}

#[derive(Serialize)]
struct BulkHeader<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    doc_type: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

impl Document {
    /// Creates a document from its parts.
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        source: Value,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
            source,
        }
    }

    /// Checks that index, type and id are present and the source is an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first missing piece.
    pub fn validate(&self) -> Result<()> {
        let missing = if self.index.is_empty() {
            "_index"
        } else if self.doc_type.is_empty() {
            "_type"
        } else if self.id.is_empty() {
            "_id"
        } else if !self.source.is_object() {
            "_source"
        } else {
            return Ok(());
        };
        Err(Error::Validation(format!(
            "document {}/{}/{} has no {}",
            self.index, self.doc_type, self.id, missing
        )))
    }

    /// Appends the two bulk lines (create header, then source) to `out`.
    ///
    /// Both lines are newline-terminated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the source cannot be serialized.
    pub fn encode_bulk(&self, out: &mut Vec<u8>) -> Result<()> {
        let action = BulkAction {
            create: BulkHeader {
                index: &self.index,
                doc_type: &self.doc_type,
                id: &self.id,
            },
        };
        serde_json::to_writer(&mut *out, &action)?;
        out.push(b'\n');
        serde_json::to_writer(&mut *out, &self.source)?;
        out.push(b'\n');
        Ok(())
    }
}

/// Opaque scroll handle, passed back verbatim on the next continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Scroll id as issued by the cluster.
    pub id: String,
}

impl Cursor {
    /// Wraps a scroll id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A shard-level failure reported inline on an otherwise successful page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShardFailure {
    /// Shard number (`-1` when the cluster does not know).
    #[serde(default)]
    pub shard: i64,
    /// Index the shard belongs to, if reported.
    #[serde(default)]
    pub index: Option<String>,
    /// Failure reason, kept as returned.
    #[serde(default)]
    pub reason: Value,
}

/// One page of scroll results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Documents in arrival order.
    pub documents: Vec<Document>,
    /// Total hits fixed at cursor-open time; only used for progress estimation.
    pub total_hits: u64,
    /// Shard failures reported with this page.
    pub shard_failures: Vec<ShardFailure>,
}

impl Page {
    /// True when the page carries no documents (end of stream on continuation).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Cluster health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// At least one primary shard is unassigned.
    Red,
    /// All primaries assigned, some replicas missing.
    Yellow,
    /// Fully allocated.
    Green,
    /// Health endpoint did not answer or answered garbage.
    #[serde(other)]
    Unreachable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// Result of a `/_cluster/health` call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterHealth {
    /// Cluster name, or the host when unreachable.
    #[serde(rename = "cluster_name", default)]
    pub name: String,
    /// Reported status.
    pub status: HealthStatus,
}

impl ClusterHealth {
    /// Health value reported when the endpoint cannot be queried.
    pub fn unreachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unreachable,
        }
    }
}

/// Version block of the root endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterVersion {
    /// Version string, e.g. `5.2.0`.
    #[serde(default)]
    pub number: String,
}
