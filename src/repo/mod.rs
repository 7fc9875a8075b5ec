//! Persistence seams: alarm log, telemetry log and rack reference data.
//!
//! Without the `db` feature every store lives in memory.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::domain::{AlarmKey, AlarmRecord, RackConfig, TelemetryRow};

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;
pub mod rack_cache;

pub use rack_cache::RackCache;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid stored value: {0}")]
    InvalidData(String),
}

#[cfg(feature = "db")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Append-only alarm event log
#[async_trait]
pub trait AlarmLogStore: Send + Sync {
    /// Most recent record for one (rack, module, cell, kind)
    async fn latest(&self, key: &AlarmKey) -> Result<Option<AlarmRecord>, StoreError>;

    async fn append(&self, record: &AlarmRecord) -> Result<(), StoreError>;
}

/// Per-cell telemetry log and its discharge-only sibling
#[async_trait]
pub trait TelemetryLogStore: Send + Sync {
    async fn append_battery_log(&self, rows: &[TelemetryRow]) -> Result<(), StoreError>;

    async fn append_discharge_log(&self, rows: &[TelemetryRow]) -> Result<(), StoreError>;
}

/// Read-only rack and module reference data
#[async_trait]
pub trait RackConfigSource: Send + Sync {
    async fn load_rack(&self) -> Result<RackConfig, StoreError>;
}

pub struct Repositories {
    pub alarms: Arc<dyn AlarmLogStore>,
    pub telemetry: Arc<dyn TelemetryLogStore>,
    pub racks: Arc<dyn RackConfigSource>,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> Result<Self> {
        #[cfg(feature = "db")]
        {
            let db = Arc::new(
                crate::repo::pg::PgRepo::connect(&cfg.db.url, cfg.db.max_connections).await?,
            );
            return Ok(Self {
                alarms: db.clone(),
                telemetry: db.clone(),
                racks: db,
            });
        }

        #[cfg(not(feature = "db"))]
        {
            return Ok(Self::in_memory(cfg.rack.clone()));
        }
    }

    pub fn in_memory(rack: RackConfig) -> Self {
        Self {
            alarms: Arc::new(memory::MemoryAlarmLog::new()),
            telemetry: Arc::new(memory::MemoryTelemetryLog::new()),
            racks: Arc::new(memory::StaticRackSource::new(rack)),
        }
    }
}
