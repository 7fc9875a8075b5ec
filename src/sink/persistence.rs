use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error};

use super::TelemetrySink;
use crate::alarms::{AlarmEdgeLogger, CellReading};
use crate::domain::{
    BatchResult, DischargePhase, RackConfig, TelemetryRow, UNREAD_STATE_CODE,
};
use crate::repo::{AlarmLogStore, RackCache, TelemetryLogStore};

/// Readings above this come from a disconnected sensor
pub const MAX_PLAUSIBLE_TEMP_C: f64 = 120.0;
/// Value stored for a disconnected temperature sensor
pub const DISCONNECTED_SENSOR_TEMP_C: f64 = -35.0;
/// Rows with a current below this are mirrored into the discharge log
pub const DISCHARGE_LOG_CURRENT_A: f64 = 0.0;

pub fn sanitize_temperature(celsius: f64) -> f64 {
    if celsius > MAX_PLAUSIBLE_TEMP_C {
        DISCONNECTED_SENSOR_TEMP_C
    } else {
        celsius
    }
}

/// One row per installed cell of every module in the batch
pub fn build_rows(
    batch: &BatchResult,
    phase: DischargePhase,
    rack: &RackConfig,
    timestamp: DateTime<Utc>,
) -> Vec<TelemetryRow> {
    let mut rows = Vec::new();

    for (&module_id, s) in &batch.modules {
        let cells = rack.installed_cells(module_id);
        for cell_number in 1..=cells {
            let row = if s.is_success() {
                TelemetryRow {
                    timestamp,
                    rack_id: rack.rack_id,
                    module_id,
                    cell_number,
                    voltage_v: s.cell_voltages_v[cell_number as usize - 1],
                    impedance: 0.0,
                    current_a: s.current_a,
                    temperature_c: sanitize_temperature(s.avg_cell_temp_c),
                    soc: s.soc_percent / 100.0,
                    state: phase.code(),
                    total_voltage_v: s.pack_voltage_v,
                }
            } else {
                TelemetryRow {
                    timestamp,
                    rack_id: rack.rack_id,
                    module_id,
                    cell_number,
                    voltage_v: 0.0,
                    impedance: 0.0,
                    current_a: 0.0,
                    temperature_c: 0.0,
                    soc: 0.0,
                    state: UNREAD_STATE_CODE,
                    total_voltage_v: 0.0,
                }
            };
            rows.push(row);
        }
    }

    rows
}

/// Writes the telemetry log, its discharge mirror and alarm edges
pub struct PersistenceSink {
    telemetry: Arc<dyn TelemetryLogStore>,
    alarms: AlarmEdgeLogger,
    rack: Arc<RackCache>,
}

impl PersistenceSink {
    pub fn new(
        telemetry: Arc<dyn TelemetryLogStore>,
        alarm_store: Arc<dyn AlarmLogStore>,
        rack: Arc<RackCache>,
    ) -> Self {
        Self {
            telemetry,
            alarms: AlarmEdgeLogger::new(alarm_store),
            rack,
        }
    }

    pub async fn persist(&self, batch: &BatchResult, phase: DischargePhase) -> usize {
        let rack = self.rack.current();
        let timestamp = Utc::now();
        let rows = build_rows(batch, phase, &rack, timestamp);

        if let Err(e) = self.telemetry.append_battery_log(&rows).await {
            error!(cycle_id = %batch.cycle_id, rows = rows.len(), error = %e, "battery log write failed");
        }

        let discharge: Vec<TelemetryRow> = rows
            .iter()
            .filter(|r| r.state != UNREAD_STATE_CODE && r.current_a < DISCHARGE_LOG_CURRENT_A)
            .cloned()
            .collect();
        if !discharge.is_empty() {
            if let Err(e) = self.telemetry.append_discharge_log(&discharge).await {
                error!(cycle_id = %batch.cycle_id, rows = discharge.len(), error = %e, "discharge log write failed");
            }
        }

        let mut alarm_edges = 0;
        for row in rows.iter().filter(|r| r.state != UNREAD_STATE_CODE) {
            alarm_edges += self
                .alarms
                .process(&CellReading::from(row), &rack, timestamp)
                .await
                .len();
        }

        debug!(
            cycle_id = %batch.cycle_id,
            rows = rows.len(),
            discharge_rows = discharge.len(),
            alarm_edges,
            "batch persisted"
        );
        rows.len()
    }
}

#[async_trait]
impl TelemetrySink for PersistenceSink {
    fn name(&self) -> &'static str {
        "persistence"
    }

    async fn on_batch_result(&self, batch: &BatchResult, phase: DischargePhase) -> Result<()> {
        self.persist(batch, phase).await;
        Ok(())
    }
}
