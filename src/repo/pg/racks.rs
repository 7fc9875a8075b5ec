use async_trait::async_trait;
use sqlx::PgPool;

use super::PgRepo;
use crate::domain::{ModuleConfig, RackConfig};
use crate::repo::{RackConfigSource, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RackRow {
    pub rackno: i32,
    pub rackname: String,
    pub installedmodule: i32,
    pub nominalvoltage: f64,
    pub highvoltage: f64,
    pub lowvoltage: f64,
    pub hightemperature: f64,
    pub highimpedance: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ModuleRow {
    pub moduleno: i32,
    pub installedbat: i32,
}

pub struct RackRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RackRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// First configured rack with its module table
    pub async fn find_primary(&self) -> Result<RackConfig, StoreError> {
        let rack = sqlx::query_as::<_, RackRow>(
            r#"
            SELECT rackno, rackname, installedmodule, nominalvoltage,
                   highvoltage, lowvoltage, hightemperature, highimpedance
            FROM rack
            ORDER BY rackno
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("rack table is empty".to_string()))?;

        let modules = sqlx::query_as::<_, ModuleRow>(
            r#"
            SELECT moduleno, installedbat
            FROM module
            WHERE rackno = $1
            ORDER BY moduleno
            "#,
        )
        .bind(rack.rackno)
        .fetch_all(self.pool)
        .await?;

        let installed_modules = u8::try_from(rack.installedmodule).map_err(|_| {
            StoreError::InvalidData(format!("installed module count {}", rack.installedmodule))
        })?;

        let modules = modules
            .into_iter()
            .map(|m| {
                Ok(ModuleConfig {
                    module_id: u8::try_from(m.moduleno).map_err(|_| {
                        StoreError::InvalidData(format!("module number {}", m.moduleno))
                    })?,
                    installed_cells: u8::try_from(m.installedbat).map_err(|_| {
                        StoreError::InvalidData(format!("installed cells {}", m.installedbat))
                    })?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(RackConfig {
            rack_id: rack.rackno,
            name: rack.rackname,
            installed_modules,
            nominal_voltage: rack.nominalvoltage,
            high_voltage: rack.highvoltage,
            low_voltage: rack.lowvoltage,
            high_temperature: rack.hightemperature,
            high_impedance: rack.highimpedance,
            modules,
        })
    }
}

#[async_trait]
impl RackConfigSource for PgRepo {
    async fn load_rack(&self) -> Result<RackConfig, StoreError> {
        self.racks().find_primary().await
    }
}
