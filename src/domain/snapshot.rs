use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::flags::{CellUvState, FaultFlags, ProtectionFlags, WarningFlags};

/// Number of cell voltage / temperature slots in every snapshot
pub const CELL_SLOTS: usize = 16;

/// Outcome of one module read
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReadStatus {
    Success,
    Failed,
}

/// Decoded telemetry of one battery module for one polling cycle.
///
/// Unused cell slots (beyond `installed_cell_count` / `temp_sensor_count`)
/// carry whatever the BMS reports there, usually zero.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModuleSnapshot {
    pub module_id: u8,
    pub pack_voltage_v: f64,
    pub current_a: f64,
    pub remaining_capacity_ah: f64,
    pub avg_cell_temp_c: f64,
    pub ambient_temp_c: f64,
    pub warning_flags: WarningFlags,
    pub protection_flags: ProtectionFlags,
    pub fault_flags: FaultFlags,
    pub soc_percent: f64,
    pub soh_percent: f64,
    pub circulate_count: u16,
    pub pcb_temp_c: f64,
    pub history_discharge_capacity: u16,
    pub installed_cell_count: u16,
    pub cell_voltages_v: [f64; CELL_SLOTS],
    pub temp_sensor_count: u16,
    pub cell_temps_c: [f64; CELL_SLOTS],
    pub full_capacity: u16,
    pub remain_charge_time_min: u16,
    pub remain_discharge_time_min: u16,
    pub cell_uv_state: CellUvState,
    pub status: ReadStatus,
    pub timestamp: DateTime<Utc>,
}

impl ModuleSnapshot {
    /// Zero-valued snapshot for a module that could not be read
    pub fn failed(module_id: u8) -> Self {
        Self::failed_at(module_id, Utc::now())
    }

    pub fn failed_at(module_id: u8, timestamp: DateTime<Utc>) -> Self {
        Self {
            module_id,
            pack_voltage_v: 0.0,
            current_a: 0.0,
            remaining_capacity_ah: 0.0,
            avg_cell_temp_c: 0.0,
            ambient_temp_c: 0.0,
            warning_flags: WarningFlags::empty(),
            protection_flags: ProtectionFlags::empty(),
            fault_flags: FaultFlags::empty(),
            soc_percent: 0.0,
            soh_percent: 0.0,
            circulate_count: 0,
            pcb_temp_c: 0.0,
            history_discharge_capacity: 0,
            installed_cell_count: 0,
            cell_voltages_v: [0.0; CELL_SLOTS],
            temp_sensor_count: 0,
            cell_temps_c: [0.0; CELL_SLOTS],
            full_capacity: 0,
            remain_charge_time_min: 0,
            remain_discharge_time_min: 0,
            cell_uv_state: CellUvState::empty(),
            status: ReadStatus::Failed,
            timestamp,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReadStatus::Success
    }

    /// Voltages of the cells the BMS reports as installed
    pub fn installed_cell_voltages(&self) -> &[f64] {
        let n = (self.installed_cell_count as usize).min(CELL_SLOTS);
        &self.cell_voltages_v[..n]
    }
}

/// Success/failure counts of one polling cycle
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Coarse health classification of the whole battery system
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SystemHealth {
    Normal,
    Warning,
    Alarm,
    Unknown,
}

const LOW_SOC_WARNING_PERCENT: f64 = 30.0;
const MIN_CELL_TEMP_C: f64 = -10.0;
const MAX_CELL_TEMP_C: f64 = 60.0;

/// All module snapshots of one polling cycle, keyed by module index
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub modules: BTreeMap<u8, ModuleSnapshot>,
    pub summary: BatchSummary,
}

impl BatchResult {
    pub fn new(
        cycle_id: Uuid,
        started_at: DateTime<Utc>,
        snapshots: impl IntoIterator<Item = ModuleSnapshot>,
    ) -> Self {
        let modules: BTreeMap<u8, ModuleSnapshot> = snapshots
            .into_iter()
            .map(|s| (s.module_id, s))
            .collect();

        let success = modules.values().filter(|s| s.is_success()).count();
        let summary = BatchSummary {
            total: modules.len(),
            success,
            failed: modules.len() - success,
        };

        Self {
            cycle_id,
            started_at,
            modules,
            summary,
        }
    }

    pub fn module(&self, module_id: u8) -> Option<&ModuleSnapshot> {
        self.modules.get(&module_id)
    }

    pub fn successful(&self) -> impl Iterator<Item = &ModuleSnapshot> {
        self.modules.values().filter(|s| s.is_success())
    }

    pub fn health(&self) -> SystemHealth {
        let mut any_ok = false;
        let mut warning = false;

        for snapshot in self.successful() {
            any_ok = true;

            if !snapshot.protection_flags.is_empty() || snapshot.fault_flags.has_error() {
                return SystemHealth::Alarm;
            }

            if snapshot.soc_percent < LOW_SOC_WARNING_PERCENT
                || snapshot.avg_cell_temp_c < MIN_CELL_TEMP_C
                || snapshot.avg_cell_temp_c > MAX_CELL_TEMP_C
                || !snapshot.warning_flags.is_empty()
            {
                warning = true;
            }
        }

        match (any_ok, warning) {
            (false, _) => SystemHealth::Unknown,
            (true, true) => SystemHealth::Warning,
            (true, false) => SystemHealth::Normal,
        }
    }
}
