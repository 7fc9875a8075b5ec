pub mod battery;
pub mod error;
pub mod health;
pub mod response;

use axum::{routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::app::AppState;

pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.cfg.server.request_timeout_seconds);

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/battery", get(battery::get_battery))
        .route("/api/battery/:module_id", get(battery::get_module))
        .route("/api/stats", get(battery::get_stats))
        .route("/api/snmp", get(battery::get_snmp_values))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TimeoutLayer::new(timeout)))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::{BatchResult, DischargePhase, ModuleSnapshot, ReadStatus};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::Value;
    use tower::util::ServiceExt;
    use uuid::Uuid;

    fn live(module_id: u8) -> ModuleSnapshot {
        ModuleSnapshot {
            pack_voltage_v: 53.0,
            soc_percent: 70.0,
            avg_cell_temp_c: 25.0,
            status: ReadStatus::Success,
            ..ModuleSnapshot::failed(module_id)
        }
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_battery_not_available_before_first_cycle() {
        let state = AppState::new(Config::default());
        let (status, body) = get_json(state, "/api/battery").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_battery_not_available_when_all_modules_failed() {
        let state = AppState::new(Config::default());
        let batch = BatchResult::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![ModuleSnapshot::failed(1), ModuleSnapshot::failed(2)],
        );
        state.status.store(&batch, DischargePhase::FloatingCharge);

        let (status, _) = get_json(state, "/api/battery").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_battery_returns_latest_batch() {
        let state = AppState::new(Config::default());
        let batch = BatchResult::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![live(1), ModuleSnapshot::failed(2)],
        );
        state.status.store(&batch, DischargePhase::DischargeStart);

        let (status, body) = get_json(state, "/api/battery").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["phase"], "discharge_start");
        assert_eq!(body["data"]["phase_code"], 5);
        assert_eq!(body["data"]["batch"]["summary"]["success"], 1);
        assert_eq!(body["data"]["batch"]["modules"]["2"]["status"], "failed");
        assert_eq!(body["metadata"]["total_count"], 2);
    }

    #[tokio::test]
    async fn test_single_module() {
        let state = AppState::new(Config::default());
        let batch = BatchResult::new(Uuid::new_v4(), Utc::now(), vec![live(1)]);
        state.status.store(&batch, DischargePhase::FloatingCharge);

        let (status, body) = get_json(state.clone(), "/api/battery/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pack_voltage_v"], 53.0);

        let (status, _) = get_json(state, "/api/battery/9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_module_id_is_bad_request() {
        let state = AppState::new(Config::default());
        let batch = BatchResult::new(Uuid::new_v4(), Utc::now(), vec![live(1)]);
        state.status.store(&batch, DischargePhase::FloatingCharge);

        for uri in ["/api/battery/abc", "/api/battery/300", "/api/battery/-1"] {
            let (status, body) = get_json(state.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "BadRequest");
            assert!(body["message"].as_str().unwrap().starts_with("Bad request:"));
        }
    }

    #[tokio::test]
    async fn test_stats_and_health() {
        let state = AppState::new(Config::default());
        state
            .metrics
            .record_success(std::time::Duration::from_millis(120));

        let (status, body) = get_json(state.clone(), "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_requests"], 1);
        assert_eq!(body["data"]["success_rate_percent"], 100.0);

        let (status, body) = get_json(state, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["battery"], "unknown");
    }

    #[tokio::test]
    async fn test_snmp_values() {
        let state = AppState::new(Config::default());
        let batch = BatchResult::new(Uuid::new_v4(), Utc::now(), vec![live(1)]);
        state.snmp.update(&batch, DischargePhase::FloatingCharge);

        let (status, body) = get_json(state, "/api/snmp").await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["data"].as_array().unwrap();
        let soc = entries
            .iter()
            .find(|e| e["oid"] == "1.3.6.1.4.1.64016.1.2.10")
            .unwrap();
        assert_eq!(soc["type"], "gauge");
        assert_eq!(soc["value"], 70);
    }
}
