#![cfg(feature = "db")]

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

pub mod alarm_log;
pub mod racks;
pub mod telemetry_log;

pub use alarm_log::AlarmLogRepository;
pub use racks::RackRepository;
pub use telemetry_log::TelemetryLogRepository;

/// Postgres-backed stores for the `rack`, `module`, `batterylog`,
/// `dischargebatterylog` and `alarmlog` tables
pub struct PgRepo {
    pub pool: PgPool,
}

impl PgRepo {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "database pool connected");
        Ok(Self { pool })
    }

    pub fn alarm_log(&self) -> AlarmLogRepository<'_> {
        AlarmLogRepository::new(&self.pool)
    }

    pub fn telemetry_log(&self) -> TelemetryLogRepository<'_> {
        TelemetryLogRepository::new(&self.pool)
    }

    pub fn racks(&self) -> RackRepository<'_> {
        RackRepository::new(&self.pool)
    }
}
