//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always 200; the `state` field tells "up but draining" apart from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();

    Json(json!({
        "state": health.as_str(),
        "batches_in_flight": state.shutdown.batches_in_flight(),
        "batches_completed": state.shutdown.batches_completed(),
        "max_operations": state.batch.max_operations,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe. Always 200 while the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when ready, 503 while starting, draining, or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;

    use super::*;
    use crate::network::NetworkConfig;
    use crate::service::BatchConfig;

    fn test_state() -> AppState {
        AppState::new(Router::new(), BatchConfig::default(), NetworkConfig::default())
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state();
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "ready");
        assert_eq!(json["batches_in_flight"], 0);
        assert_eq!(json["batches_completed"], 0);
        assert_eq!(json["max_operations"], 50);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_starting_state() {
        let json = health_handler(State(test_state())).await.0;
        assert_eq!(json["state"], "starting");
    }

    #[tokio::test]
    async fn health_handler_reports_running_batches() {
        let state = test_state();
        state.shutdown.set_ready();
        let _guard = state.shutdown.admit_batch().unwrap();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["batches_in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
