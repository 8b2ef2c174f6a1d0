//! Version probing and dialect selection.

use std::sync::Arc;
use tracing::info;

use crate::cluster::{ClusterApi, CurrentApi, Dialect, Endpoint, LegacyApi};
use crate::error::Result;

/// Maps a version string to the dialect that speaks it.
#[must_use]
pub fn select_dialect(version: &str) -> Dialect {
    if version.starts_with("5.") {
        Dialect::Current
    } else {
        Dialect::Legacy
    }
}

/// Queries the endpoint version and returns the matching adapter.
///
/// # Errors
///
/// Any failure to reach the root endpoint or to parse its version is
/// returned as-is; probing is never retried.
pub async fn probe(endpoint: Endpoint) -> Result<Arc<dyn ClusterApi>> {
    let version = endpoint.version().await?;
    let dialect = select_dialect(&version.number);
    info!(
        host = endpoint.url(),
        version = %version.number,
        %dialect,
        "probed cluster"
    );
    Ok(match dialect {
        Dialect::Current => Arc::new(CurrentApi::new(endpoint)),
        Dialect::Legacy => Arc::new(LegacyApi::new(endpoint)),
    })
}
