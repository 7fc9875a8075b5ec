use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::acquisition::{AcquisitionOrchestrator, DischargeStateTracker};
use crate::config::Config;
use crate::gateway::Gateway;
use crate::modbus::{build_transport, metrics, BusLock, BusMetrics, ModuleReader, RegisterTransport};
use crate::repo::{RackCache, Repositories};
use crate::sink::{PersistenceSink, SnmpValueCache, StatusCache, TelemetrySink};

/// Shared handles served by the REST API
#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub status: Arc<StatusCache>,
    pub snmp: Arc<SnmpValueCache>,
    pub metrics: Arc<BusMetrics>,
    /// Rack reference data shared by the SNMP and persistence sinks
    pub rack: Arc<RackCache>,
}

impl AppState {
    pub fn new(cfg: Config) -> Self {
        let rack = Arc::new(RackCache::new(cfg.rack.clone()));
        let snmp = SnmpValueCache::new(cfg.snmp.enterprise_oid.clone(), Arc::clone(&rack));
        Self {
            cfg,
            status: Arc::new(StatusCache::new()),
            snmp: Arc::new(snmp),
            metrics: Arc::new(BusMetrics::new()),
            rack,
        }
    }

    /// Wire the polling gateway over the given transport and stores
    pub async fn build_gateway(
        &self,
        transport: Arc<dyn RegisterTransport>,
        repos: &Repositories,
    ) -> Result<Gateway> {
        let cfg = &self.cfg;

        // falls back to the configured rack when the store is unavailable
        let rack = self.rack.reload(repos.racks.as_ref()).await;
        info!(
            rack_id = rack.rack_id,
            name = %rack.name,
            modules = rack.installed_modules,
            "rack configuration loaded"
        );

        let reader = ModuleReader::new(
            transport,
            BusLock::new(cfg.bus.lock()),
            Arc::clone(&self.metrics),
            cfg.acquisition.reader(&cfg.bus),
        );
        let orchestrator = AcquisitionOrchestrator::new(Arc::new(reader), rack.module_ids());
        let tracker = DischargeStateTracker::new(
            cfg.discharge.thresholds(),
            cfg.acquisition.reference_module,
        );

        let persistence = PersistenceSink::new(
            Arc::clone(&repos.telemetry),
            Arc::clone(&repos.alarms),
            Arc::clone(&self.rack),
        );
        let sinks: Vec<Arc<dyn TelemetrySink>> = vec![
            self.snmp.clone() as Arc<dyn TelemetrySink>,
            self.status.clone() as Arc<dyn TelemetrySink>,
            Arc::new(persistence) as Arc<dyn TelemetrySink>,
        ];

        Ok(
            Gateway::new(orchestrator, tracker, sinks, cfg.acquisition.interval())
                .with_rack_reload(Arc::clone(&repos.racks), Arc::clone(&self.rack)),
        )
    }
}

/// Build everything from configuration and start the background tasks
pub async fn start(
    cfg: Config,
    shutdown: CancellationToken,
) -> Result<(AppState, Vec<JoinHandle<()>>)> {
    let state = AppState::new(cfg);
    let repos = Repositories::new(&state.cfg).await?;
    let transport = build_transport(&state.cfg.bus)?;
    let gateway = state.build_gateway(transport, &repos).await?;

    let tasks = spawn_gateway_tasks(&state, gateway, shutdown);
    Ok((state, tasks))
}

pub fn spawn_gateway_tasks(
    state: &AppState,
    gateway: Gateway,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let poll = tokio::spawn(gateway.run(shutdown.clone()));

    let acq = &state.cfg.acquisition;
    let monitor = tokio::spawn(metrics::run_monitor(
        Arc::clone(&state.metrics),
        Duration::from_secs(acq.stats_interval_seconds),
        Duration::from_secs(acq.stall_warning_seconds),
        shutdown,
    ));

    vec![poll, monitor]
}
