use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::TelemetrySink;
use crate::domain::{BatchResult, DischargePhase, SystemHealth};

/// Latest cycle as served by the REST API
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub batch: BatchResult,
    pub phase: DischargePhase,
    pub phase_code: i32,
    pub health: SystemHealth,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct StatusCache {
    latest: RwLock<Option<StatusSnapshot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.latest.read().clone()
    }

    pub fn store(&self, batch: &BatchResult, phase: DischargePhase) {
        let snapshot = StatusSnapshot {
            batch: batch.clone(),
            phase,
            phase_code: phase.code(),
            health: batch.health(),
            received_at: Utc::now(),
        };
        *self.latest.write() = Some(snapshot);
    }
}

#[async_trait]
impl TelemetrySink for StatusCache {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn on_batch_result(&self, batch: &BatchResult, phase: DischargePhase) -> Result<()> {
        self.store(batch, phase);
        Ok(())
    }
}
