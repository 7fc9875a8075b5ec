//! Consumers of every completed polling cycle.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{BatchResult, DischargePhase};

pub mod persistence;
pub mod snmp;
pub mod status;

pub use persistence::PersistenceSink;
pub use snmp::{SnmpValue, SnmpValueCache};
pub use status::{StatusCache, StatusSnapshot};

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_batch_result(&self, batch: &BatchResult, phase: DischargePhase) -> Result<()>;
}
