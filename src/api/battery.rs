use axum::extract::{rejection::PathRejection, Path, State};
use serde::Serialize;

use super::error::ApiError;
use super::response::{success, ApiResponse};
use crate::app::AppState;
use crate::domain::ModuleSnapshot;
use crate::modbus::BusStats;
use crate::sink::{SnmpValue, StatusSnapshot};

/// Latest polling cycle. 404 until one module has been read successfully.
pub async fn get_battery(
    State(st): State<AppState>,
) -> Result<ApiResponse<StatusSnapshot>, ApiError> {
    let snapshot = st
        .status
        .latest()
        .ok_or_else(|| ApiError::NotFound("Battery data not available".to_string()))?;

    if snapshot.batch.summary.success == 0 {
        return Err(ApiError::NotFound("Battery data not available".to_string()));
    }

    let received_at = snapshot.received_at;
    let count = snapshot.batch.summary.total;
    Ok(success(snapshot).with_count(count).with_age(received_at))
}

/// One module of the latest cycle. Ids that are not a module index are a 400.
pub async fn get_module(
    State(st): State<AppState>,
    module_id: Result<Path<u8>, PathRejection>,
) -> Result<ApiResponse<ModuleSnapshot>, ApiError> {
    let Path(module_id) = module_id?;
    let snapshot = st
        .status
        .latest()
        .ok_or_else(|| ApiError::NotFound("Battery data not available".to_string()))?;

    let module = snapshot
        .batch
        .module(module_id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("module {module_id}")))?;

    Ok(success(module).with_age(snapshot.received_at))
}

pub async fn get_stats(State(st): State<AppState>) -> ApiResponse<BusStats> {
    success(st.metrics.snapshot())
}

#[derive(Debug, Serialize)]
pub struct SnmpEntry {
    pub oid: String,
    #[serde(flatten)]
    pub value: SnmpValue,
}

pub async fn get_snmp_values(State(st): State<AppState>) -> ApiResponse<Vec<SnmpEntry>> {
    let entries: Vec<SnmpEntry> = st
        .snmp
        .entries()
        .into_iter()
        .map(|(oid, value)| SnmpEntry { oid, value })
        .collect();
    let count = entries.len();
    success(entries).with_count(count)
}
