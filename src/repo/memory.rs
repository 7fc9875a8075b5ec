use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{AlarmLogStore, RackConfigSource, StoreError, TelemetryLogStore};
use crate::domain::{AlarmKey, AlarmRecord, RackConfig, TelemetryRow};

/// In-memory alarm log with an index of the latest record per key
#[derive(Debug, Default)]
pub struct MemoryAlarmLog {
    inner: RwLock<AlarmLogInner>,
}

#[derive(Debug, Default)]
struct AlarmLogInner {
    records: Vec<AlarmRecord>,
    latest: HashMap<AlarmKey, usize>,
}

impl MemoryAlarmLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first
    pub fn records(&self) -> Vec<AlarmRecord> {
        self.inner.read().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlarmLogStore for MemoryAlarmLog {
    async fn latest(&self, key: &AlarmKey) -> Result<Option<AlarmRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.latest.get(key).map(|&i| inner.records[i].clone()))
    }

    async fn append(&self, record: &AlarmRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let index = inner.records.len();
        inner.records.push(record.clone());
        inner.latest.insert(record.key(), index);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTelemetryLog {
    battery: RwLock<Vec<TelemetryRow>>,
    discharge: RwLock<Vec<TelemetryRow>>,
}

impl MemoryTelemetryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn battery_rows(&self) -> Vec<TelemetryRow> {
        self.battery.read().clone()
    }

    pub fn discharge_rows(&self) -> Vec<TelemetryRow> {
        self.discharge.read().clone()
    }
}

#[async_trait]
impl TelemetryLogStore for MemoryTelemetryLog {
    async fn append_battery_log(&self, rows: &[TelemetryRow]) -> Result<(), StoreError> {
        self.battery.write().extend_from_slice(rows);
        Ok(())
    }

    async fn append_discharge_log(&self, rows: &[TelemetryRow]) -> Result<(), StoreError> {
        self.discharge.write().extend_from_slice(rows);
        Ok(())
    }
}

/// Rack reference data taken from the configuration file
#[derive(Debug, Clone)]
pub struct StaticRackSource {
    rack: RackConfig,
}

impl StaticRackSource {
    pub fn new(rack: RackConfig) -> Self {
        Self { rack }
    }
}

#[async_trait]
impl RackConfigSource for StaticRackSource {
    async fn load_rack(&self) -> Result<RackConfig, StoreError> {
        Ok(self.rack.clone())
    }
}
