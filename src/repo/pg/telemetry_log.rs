use async_trait::async_trait;
use sqlx::PgPool;

use super::PgRepo;
use crate::domain::TelemetryRow;
use crate::repo::{StoreError, TelemetryLogStore};

/// Target table of a telemetry batch
#[derive(Debug, Clone, Copy)]
enum LogTable {
    Battery,
    Discharge,
}

impl LogTable {
    fn insert_sql(self) -> &'static str {
        match self {
            LogTable::Battery => {
                r#"
                INSERT INTO batterylog
                    (datetime, rackno, moduleno, batnumber, voltage, impedance,
                     ampere, temperature, soc, state, totalvoltage)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#
            }
            LogTable::Discharge => {
                r#"
                INSERT INTO dischargebatterylog
                    (datetime, rackno, moduleno, batnumber, voltage, impedance,
                     ampere, temperature, soc, state, totalvoltage)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#
            }
        }
    }
}

pub struct TelemetryLogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TelemetryLogRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    async fn insert_batch(&self, table: LogTable, rows: &[TelemetryRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(table.insert_sql())
                .bind(row.timestamp)
                .bind(row.rack_id)
                .bind(row.module_id as i32)
                .bind(row.cell_number as i32)
                .bind(row.voltage_v)
                .bind(row.impedance)
                .bind(row.current_a)
                .bind(row.temperature_c)
                .bind(row.soc)
                .bind(row.state)
                .bind(row.total_voltage_v)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_battery_rows(&self, rows: &[TelemetryRow]) -> Result<(), StoreError> {
        self.insert_batch(LogTable::Battery, rows).await
    }

    pub async fn insert_discharge_rows(&self, rows: &[TelemetryRow]) -> Result<(), StoreError> {
        self.insert_batch(LogTable::Discharge, rows).await
    }
}

#[async_trait]
impl TelemetryLogStore for PgRepo {
    async fn append_battery_log(&self, rows: &[TelemetryRow]) -> Result<(), StoreError> {
        self.telemetry_log().insert_battery_rows(rows).await
    }

    async fn append_discharge_log(&self, rows: &[TelemetryRow]) -> Result<(), StoreError> {
        self.telemetry_log().insert_discharge_rows(rows).await
    }
}
