//! Error types for esmigrate.
//!
//! Every failure a migration can hit is funneled through [`Error`]. Whether an
//! error aborts the run or is only logged is decided by the call site: cursor
//! open and dialect probing propagate, cursor continuation and batch writes log
//! and count.

use thiserror::Error;

/// Result type alias for esmigrate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating between clusters.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection, DNS or timeout failure talking to an endpoint.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-success HTTP status.
    #[error("Protocol error {status}: {body}")]
    Protocol {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the cluster.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Document is missing a required field.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Endpoint rejected the credentials (401/403).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Endpoint is throttling requests; retry after the given seconds.
    #[error("Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Cluster never reached an acceptable health status before the deadline.
    #[error("Cluster {name} still {status} after readiness deadline")]
    ReadinessTimeout {
        /// Cluster name (or host when unreachable).
        name: String,
        /// Last observed status.
        status: String,
    },

    /// The run was cancelled before completion.
    #[error("Migration cancelled")]
    Cancelled,

    /// A batch write failed under the fail-fast policy.
    #[error("Bulk write failed: {0}")]
    WriteFailed(String),
}

impl Error {
    /// Builds the error matching a non-success HTTP response.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(body),
            429 => Self::RateLimit(60),
            _ => Self::Protocol { status, body },
        }
    }

    /// Returns true for failures worth retrying: transport, throttling and 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimit(_) => true,
            Self::Protocol { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
