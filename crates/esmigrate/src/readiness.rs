//! Health polling that holds the migration until both clusters can take load.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::error::{Error, Result};
use crate::model::{ClusterHealth, HealthStatus};

/// Returns true if `status` allows the migration to start.
#[must_use]
pub fn is_acceptable(status: HealthStatus, tolerate_yellow: bool) -> bool {
    match status {
        HealthStatus::Green => true,
        HealthStatus::Yellow => tolerate_yellow,
        HealthStatus::Red | HealthStatus::Unreachable => false,
    }
}

/// Polls cluster health on a fixed interval until it is acceptable.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    interval: Duration,
    deadline: Option<Duration>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), None)
    }
}

impl ReadinessGate {
    /// Creates a gate polling every `interval`, giving up after `deadline` if set.
    #[must_use]
    pub fn new(interval: Duration, deadline: Option<Duration>) -> Self {
        Self { interval, deadline }
    }

    /// Blocks until `api` reports green, or yellow when `tolerate_yellow`.
    ///
    /// Red and unreachable always cause another wait cycle.
    ///
    /// # Errors
    ///
    /// [`Error::ReadinessTimeout`] once the deadline passes,
    /// [`Error::Cancelled`] if `cancel` fires.
    pub async fn wait_until_ready(
        &self,
        api: &dyn ClusterApi,
        tolerate_yellow: bool,
        cancel: &CancellationToken,
    ) -> Result<ClusterHealth> {
        let started = Instant::now();
        loop {
            let health = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                health = api.health() => health,
            };
            if is_acceptable(health.status, tolerate_yellow) {
                return Ok(health);
            }
            self.pause(&health, api.host(), started, cancel).await?;
        }
    }

    /// Waits for both endpoints, re-checking the source after every wait the
    /// same way a single combined poll loop would.
    ///
    /// # Errors
    ///
    /// See [`ReadinessGate::wait_until_ready`].
    pub async fn wait_for_both(
        &self,
        source: &dyn ClusterApi,
        target: &dyn ClusterApi,
        tolerate_yellow: bool,
        cancel: &CancellationToken,
    ) -> Result<(ClusterHealth, ClusterHealth)> {
        let started = Instant::now();
        loop {
            let source_health = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                health = source.health() => health,
            };
            if !is_acceptable(source_health.status, tolerate_yellow) {
                self.pause(&source_health, source.host(), started, cancel)
                    .await?;
                continue;
            }
            let target_health = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                health = target.health() => health,
            };
            if !is_acceptable(target_health.status, tolerate_yellow) {
                self.pause(&target_health, target.host(), started, cancel)
                    .await?;
                continue;
            }
            return Ok((source_health, target_health));
        }
    }

    async fn pause(
        &self,
        health: &ClusterHealth,
        host: &str,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if started.elapsed() + self.interval > deadline {
                return Err(Error::ReadinessTimeout {
                    name: health.name.clone(),
                    status: health.status.to_string(),
                });
            }
        }
        info!(
            "{} at {} is {}, delaying move",
            health.name, host, health.status
        );
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            () = sleep(self.interval) => Ok(()),
        }
    }
}
