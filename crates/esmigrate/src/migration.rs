//! End-to-end migration run: probe, prepare, wait, stream.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::{probe, ClusterApi, Endpoint};
use crate::config::{MigrationConfig, PipelineConfig};
use crate::error::{Error, Result};
use crate::indices::{prepare_indices, restore_replicas, IndexPreparer};
use crate::pipeline::{MigrationStats, PipelineCoordinator};
use crate::readiness::ReadinessGate;

/// One configured migration between two clusters.
pub struct Migration {
    config: MigrationConfig,
    source: Endpoint,
    target: Endpoint,
}

impl Migration {
    /// Validates `config` and builds both endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid configuration.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let timeouts = config.options.http_timeouts();
        let source = Endpoint::new(&config.source, timeouts)?;
        let target = Endpoint::new(&config.target, timeouts)?;
        Ok(Self {
            config,
            source,
            target,
        })
    }

    /// Runs the migration.
    ///
    /// 1. Probe both endpoints and pick their dialects.
    /// 2. Prepare target indices, if settings/mappings copy or force is set.
    /// 3. Wait until both clusters are ready.
    /// 4. Stream every document through the pipeline.
    /// 5. Restore replication on indices created in step 2.
    ///
    /// # Errors
    ///
    /// Probe, preparation, readiness and pipeline errors; [`Error::Cancelled`]
    /// if `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<MigrationStats> {
        let options = &self.config.options;

        let (source, target) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            probed = async {
                let source = probe(self.source.clone()).await?;
                let target = probe(self.target.clone()).await?;
                Ok::<_, Error>((source, target))
            } => probed?,
        };

        let mut pipeline = PipelineConfig::from_options(options);
        let plan = if IndexPreparer::is_requested(options) {
            let plan = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                plan = prepare_indices(source.as_ref(), target.as_ref(), options) => plan?,
            };
            pipeline.index_pattern.clone_from(&plan.stream_pattern);
            Some(plan)
        } else {
            None
        };

        let gate = ReadinessGate::new(options.readiness_interval(), options.readiness_deadline());
        gate.wait_for_both(
            source.as_ref(),
            target.as_ref(),
            !options.wait_for_green,
            cancel,
        )
        .await?;

        info!("starting move..");
        let coordinator = PipelineCoordinator::new(source, target.clone(), pipeline);
        let stats = coordinator.run(cancel).await?;

        if let Some(plan) = &plan {
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                restored = restore_replicas(target.as_ref(), plan) => {
                    if let Err(e) = restored {
                        warn!("could not restore replication: {}", e);
                    }
                }
            }
        }
        Ok(stats)
    }

    /// The configuration this migration was built from.
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }
}

/// Probes both endpoints without migrating anything.
///
/// # Errors
///
/// The first probe failure.
pub async fn probe_both(
    config: &MigrationConfig,
) -> Result<(Arc<dyn ClusterApi>, Arc<dyn ClusterApi>)> {
    let timeouts = config.options.http_timeouts();
    let source = probe(Endpoint::new(&config.source, timeouts)?).await?;
    let target = probe(Endpoint::new(&config.target, timeouts)?).await?;
    Ok((source, target))
}
