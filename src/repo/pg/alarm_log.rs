use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::PgRepo;
use crate::domain::{AlarmKey, AlarmKind, AlarmRecord};
use crate::repo::{AlarmLogStore, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlarmLogRow {
    pub datetime: DateTime<Utc>,
    pub alarmtype: i32,
    pub rackno: i32,
    pub moduleno: i32,
    pub batnumber: i32,
    pub resolved: bool,
}

impl TryFrom<AlarmLogRow> for AlarmRecord {
    type Error = StoreError;

    fn try_from(row: AlarmLogRow) -> Result<Self, Self::Error> {
        let kind = AlarmKind::from_code(row.alarmtype)
            .ok_or_else(|| StoreError::InvalidData(format!("alarm type {}", row.alarmtype)))?;
        let module_id = u8::try_from(row.moduleno)
            .map_err(|_| StoreError::InvalidData(format!("module number {}", row.moduleno)))?;
        let cell_number = u8::try_from(row.batnumber)
            .map_err(|_| StoreError::InvalidData(format!("cell number {}", row.batnumber)))?;

        Ok(AlarmRecord {
            timestamp: row.datetime,
            kind,
            rack_id: row.rackno,
            module_id,
            cell_number,
            resolved: row.resolved,
        })
    }
}

pub struct AlarmLogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AlarmLogRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_latest(&self, key: &AlarmKey) -> Result<Option<AlarmRecord>, StoreError> {
        let row = sqlx::query_as::<_, AlarmLogRow>(
            r#"
            SELECT datetime, alarmtype, rackno, moduleno, batnumber, resolved
            FROM alarmlog
            WHERE rackno = $1 AND moduleno = $2 AND batnumber = $3 AND alarmtype = $4
            ORDER BY datetime DESC
            LIMIT 1
            "#,
        )
        .bind(key.rack_id)
        .bind(key.module_id as i32)
        .bind(key.cell_number as i32)
        .bind(key.kind.code())
        .fetch_optional(self.pool)
        .await?;

        row.map(AlarmRecord::try_from).transpose()
    }

    pub async fn insert(&self, record: &AlarmRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alarmlog (datetime, alarmtype, rackno, moduleno, batnumber, resolved)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.timestamp)
        .bind(record.kind.code())
        .bind(record.rack_id)
        .bind(record.module_id as i32)
        .bind(record.cell_number as i32)
        .bind(record.resolved)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AlarmLogStore for PgRepo {
    async fn latest(&self, key: &AlarmKey) -> Result<Option<AlarmRecord>, StoreError> {
        self.alarm_log().find_latest(key).await
    }

    async fn append(&self, record: &AlarmRecord) -> Result<(), StoreError> {
        self.alarm_log().insert(record).await
    }
}
