use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One per-cell row of the battery telemetry log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub timestamp: DateTime<Utc>,
    pub rack_id: i32,
    pub module_id: u8,
    pub cell_number: u8,
    pub voltage_v: f64,
    /// mΩ; this BMS does not report impedance
    pub impedance: f64,
    pub current_a: f64,
    pub temperature_c: f64,
    /// State of charge as a ratio (0..=1)
    pub soc: f64,
    /// Discharge phase code, 0 for an unread module
    pub state: i32,
    pub total_voltage_v: f64,
}
