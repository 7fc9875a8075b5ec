use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::acquisition::{AcquisitionError, AcquisitionOrchestrator, DischargeStateTracker};
use crate::domain::{BatchResult, DischargePhase};
use crate::repo::{RackCache, RackConfigSource};
use crate::sink::TelemetrySink;

struct RackReload {
    source: Arc<dyn RackConfigSource>,
    cache: Arc<RackCache>,
}

/// Periodic polling loop: read all modules, derive the phase, fan out to sinks
pub struct Gateway {
    orchestrator: AcquisitionOrchestrator,
    tracker: DischargeStateTracker,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    interval: Duration,
    rack_reload: Option<RackReload>,
}

impl Gateway {
    pub fn new(
        orchestrator: AcquisitionOrchestrator,
        tracker: DischargeStateTracker,
        sinks: Vec<Arc<dyn TelemetrySink>>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            tracker,
            sinks,
            interval,
            rack_reload: None,
        }
    }

    /// Refresh `cache` from `source` every cycle before the sinks run
    pub fn with_rack_reload(
        mut self,
        source: Arc<dyn RackConfigSource>,
        cache: Arc<RackCache>,
    ) -> Self {
        self.rack_reload = Some(RackReload { source, cache });
        self
    }

    pub fn phase(&self) -> DischargePhase {
        self.tracker.phase()
    }

    /// Run one polling cycle
    pub async fn tick(&mut self) -> Result<BatchResult, AcquisitionError> {
        let batch = self.orchestrator.run_cycle().await?;
        let phase = self.tracker.observe(&batch);
        if let Some(reload) = &self.rack_reload {
            reload.cache.reload(reload.source.as_ref()).await;
        }
        self.publish(&batch, phase).await;
        Ok(batch)
    }

    async fn publish(&self, batch: &BatchResult, phase: DischargePhase) {
        for sink in &self.sinks {
            if let Err(e) = sink.on_batch_result(batch, phase).await {
                warn!(sink = sink.name(), cycle_id = %batch.cycle_id, error = %e, "sink rejected batch");
            }
        }
    }

    /// Poll until `shutdown` is cancelled. A failed cycle is logged and the
    /// next tick proceeds as usual.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            modules = self.orchestrator.module_ids().len(),
            "gateway polling started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("gateway polling stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "polling cycle failed");
                    }
                }
            }
        }
    }
}
