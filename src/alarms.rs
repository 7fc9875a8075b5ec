//! # Alarm edge logger
//!
//! Each cell reading is checked against the rack thresholds. The alarm log only
//! receives transitions: an alarm opens when its condition becomes true while
//! the latest record is resolved (or absent), and closes when the condition
//! becomes false while the latest record is open. Repeating the same state
//! writes nothing.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{AlarmKey, AlarmKind, AlarmRecord, RackConfig, TelemetryRow};
use crate::repo::AlarmLogStore;

/// Tolerance on the rack voltage thresholds (V)
pub const VOLTAGE_MARGIN: f64 = 0.15;

/// Live values of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellReading {
    pub rack_id: i32,
    pub module_id: u8,
    pub cell_number: u8,
    pub voltage_v: f64,
    pub impedance: f64,
    pub temperature_c: f64,
}

impl From<&TelemetryRow> for CellReading {
    fn from(row: &TelemetryRow) -> Self {
        Self {
            rack_id: row.rack_id,
            module_id: row.module_id,
            cell_number: row.cell_number,
            voltage_v: row.voltage_v,
            impedance: row.impedance,
            temperature_c: row.temperature_c,
        }
    }
}

impl CellReading {
    pub fn key(&self, kind: AlarmKind) -> AlarmKey {
        AlarmKey {
            rack_id: self.rack_id,
            module_id: self.module_id,
            cell_number: self.cell_number,
            kind,
        }
    }
}

/// Whether `kind` is currently active for `reading`
pub fn is_active(kind: AlarmKind, reading: &CellReading, rack: &RackConfig) -> bool {
    match kind {
        AlarmKind::HighVoltage => reading.voltage_v > rack.high_voltage + VOLTAGE_MARGIN,
        AlarmKind::LowVoltage => reading.voltage_v < rack.low_voltage - VOLTAGE_MARGIN,
        AlarmKind::HighImpedance => reading.impedance > rack.high_impedance,
        AlarmKind::HighTemperature => reading.temperature_c > rack.high_temperature,
        AlarmKind::Discharge => false,
    }
}

pub struct AlarmEdgeLogger {
    store: Arc<dyn AlarmLogStore>,
}

impl AlarmEdgeLogger {
    pub fn new(store: Arc<dyn AlarmLogStore>) -> Self {
        Self { store }
    }

    /// Evaluate every alarm kind for one cell and append the edges.
    ///
    /// Store errors are logged per kind and never abort the evaluation of the
    /// remaining kinds. Returns the records that were written.
    pub async fn process(
        &self,
        reading: &CellReading,
        rack: &RackConfig,
        timestamp: DateTime<Utc>,
    ) -> Vec<AlarmRecord> {
        let mut written = Vec::new();

        for kind in AlarmKind::EVALUATED {
            let key = reading.key(kind);
            let active = is_active(kind, reading, rack);

            let open = match self.store.latest(&key).await {
                Ok(latest) => latest.map(|r| !r.resolved).unwrap_or(false),
                Err(e) => {
                    error!(
                        module_id = key.module_id,
                        cell = key.cell_number,
                        kind = %kind,
                        error = %e,
                        "alarm state lookup failed"
                    );
                    continue;
                }
            };

            if active == open {
                continue;
            }

            let record = AlarmRecord::new(key, timestamp, !active);
            match self.store.append(&record).await {
                Ok(()) => {
                    if active {
                        warn!(
                            rack_id = key.rack_id,
                            module_id = key.module_id,
                            cell = key.cell_number,
                            kind = %kind,
                            voltage = reading.voltage_v,
                            temperature = reading.temperature_c,
                            "{} raised",
                            kind.description()
                        );
                    } else {
                        info!(
                            rack_id = key.rack_id,
                            module_id = key.module_id,
                            cell = key.cell_number,
                            kind = %kind,
                            "{} cleared",
                            kind.description()
                        );
                    }
                    written.push(record);
                }
                Err(e) => {
                    error!(
                        module_id = key.module_id,
                        cell = key.cell_number,
                        kind = %kind,
                        error = %e,
                        "failed to append alarm record"
                    );
                }
            }
        }

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory::MemoryAlarmLog;
    use crate::repo::StoreError;
    use async_trait::async_trait;
    use rstest::rstest;

    fn reading(voltage_v: f64, temperature_c: f64) -> CellReading {
        CellReading {
            rack_id: 1,
            module_id: 2,
            cell_number: 5,
            voltage_v,
            impedance: 0.0,
            temperature_c,
        }
    }

    fn setup() -> (AlarmEdgeLogger, Arc<MemoryAlarmLog>) {
        let log = Arc::new(MemoryAlarmLog::new());
        (AlarmEdgeLogger::new(log.clone()), log)
    }

    #[rstest]
    #[case(AlarmKind::HighVoltage, 3.81, true)]
    #[case(AlarmKind::HighVoltage, 3.79, false)]
    #[case(AlarmKind::LowVoltage, 2.83, true)]
    #[case(AlarmKind::LowVoltage, 2.85, false)]
    #[case(AlarmKind::HighTemperature, 3.3, false)]
    fn test_voltage_predicates(#[case] kind: AlarmKind, #[case] volts: f64, #[case] expected: bool) {
        let rack = RackConfig::default();
        assert_eq!(is_active(kind, &reading(volts, 25.0), &rack), expected);
    }

    #[test]
    fn test_temperature_and_impedance_predicates() {
        let rack = RackConfig::default();
        assert!(is_active(AlarmKind::HighTemperature, &reading(3.3, 65.5), &rack));
        assert!(!is_active(AlarmKind::HighTemperature, &reading(3.3, 65.0), &rack));

        let mut r = reading(3.3, 25.0);
        r.impedance = 10.5;
        assert!(is_active(AlarmKind::HighImpedance, &r, &rack));
        assert!(!is_active(AlarmKind::Discharge, &r, &rack));
    }

    #[tokio::test]
    async fn test_raise_once_then_silent() {
        let (logger, log) = setup();
        let rack = RackConfig::default();

        let first = logger.process(&reading(3.9, 25.0), &rack, Utc::now()).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, AlarmKind::HighVoltage);
        assert!(!first[0].resolved);

        for _ in 0..5 {
            let again = logger.process(&reading(3.95, 25.0), &rack, Utc::now()).await;
            assert!(again.is_empty());
        }
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_writes_resolved_record() {
        let (logger, log) = setup();
        let rack = RackConfig::default();

        logger.process(&reading(3.9, 25.0), &rack, Utc::now()).await;
        let cleared = logger.process(&reading(3.3, 25.0), &rack, Utc::now()).await;

        assert_eq!(cleared.len(), 1);
        assert!(cleared[0].resolved);
        assert_eq!(cleared[0].kind, AlarmKind::HighVoltage);

        // staying normal writes nothing more
        assert!(logger.process(&reading(3.3, 25.0), &rack, Utc::now()).await.is_empty());
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_normal_reading_without_history_writes_nothing() {
        let (logger, log) = setup();
        let written = logger
            .process(&reading(3.3, 25.0), &RackConfig::default(), Utc::now())
            .await;
        assert!(written.is_empty());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_independent_kinds_per_cell() {
        let (logger, log) = setup();
        let rack = RackConfig::default();

        let both = logger.process(&reading(3.9, 70.0), &rack, Utc::now()).await;
        assert_eq!(both.len(), 2);

        // temperature recovers, voltage stays high
        let one = logger.process(&reading(3.9, 30.0), &rack, Utc::now()).await;
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].kind, AlarmKind::HighTemperature);
        assert!(one[0].resolved);

        let mut other_cell = reading(3.9, 30.0);
        other_cell.cell_number = 6;
        assert_eq!(logger.process(&other_cell, &rack, Utc::now()).await.len(), 1);
        assert_eq!(log.len(), 4);
    }

    struct BrokenStore;

    #[async_trait]
    impl AlarmLogStore for BrokenStore {
        async fn latest(&self, _key: &AlarmKey) -> Result<Option<AlarmRecord>, StoreError> {
            Err(StoreError::Database("connection reset".to_string()))
        }

        async fn append(&self, _record: &AlarmRecord) -> Result<(), StoreError> {
            Err(StoreError::Database("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_contained() {
        let logger = AlarmEdgeLogger::new(Arc::new(BrokenStore));
        let written = logger
            .process(&reading(3.9, 80.0), &RackConfig::default(), Utc::now())
            .await;
        assert!(written.is_empty());
    }
}
