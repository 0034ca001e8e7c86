//! Prometheus text exposition (SPEC_FULL.md §6).

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;

use crate::server::app::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .telemetry
        .render(state.dispatcher.queue_depth(), state.dispatcher.active_workers());

    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
