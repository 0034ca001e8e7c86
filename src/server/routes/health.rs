//! Liveness endpoint reporting registry connectivity and pool queue depth
//! (SPEC_FULL.md §6).

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct RegistryHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    registry: RegistryHealth,
    queue_depth: usize,
    active_workers: usize,
}

/// Health check endpoint.
///
/// Probes the Registry's backing store with a bounded timeout (see
/// `Dispatcher::health_check`). `200 healthy` iff the probe succeeds; `503
/// unhealthy` otherwise. Reports the pool gauges either way so an operator
/// can eyeball backpressure even during an outage.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = match state.dispatcher.health_check().await {
        Ok(()) => RegistryHealth {
            status: "ok".to_string(),
            error: None,
        },
        Err(e) => RegistryHealth {
            status: "error".to_string(),
            error: Some(e.to_string()),
        },
    };

    let is_healthy = registry.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            registry,
            queue_depth: state.dispatcher.queue_depth(),
            active_workers: state.dispatcher.active_workers(),
        }),
    )
}
