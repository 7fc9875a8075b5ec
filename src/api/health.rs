use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::AppState;
use crate::domain::SystemHealth;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    /// Health of the battery system as of the last cycle
    pub battery: SystemHealth,
}

/// Liveness probe; always 200 while the process serves requests
pub async fn healthz(State(st): State<AppState>) -> Json<HealthResponse> {
    let battery = st
        .status
        .latest()
        .map(|s| s.health)
        .unwrap_or(SystemHealth::Unknown);

    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        battery,
    })
}
