//! End-to-end: `/health` and `/metrics` report pool gauges and submission
//! counters (SPEC_FULL.md §6).

mod common;

use axum::http::StatusCode;
use common::{spawn, trivial_batch};

#[tokio::test]
async fn health_reports_registry_status_and_pool_gauges() {
    let app = spawn().await;
    let (status, body) = app.health().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["registry"]["status"], "ok");
    assert!(body["queue_depth"].is_number());
    assert!(body["active_workers"].is_number());
}

#[tokio::test]
async fn metrics_reflects_a_completed_submission() {
    let app = spawn().await;
    app.engine.register("select 1", vec![trivial_batch()]);

    let (_, submitted) = app.submit("select 1").await;
    let job_id: uuid::Uuid = submitted["job_id"].as_str().unwrap().parse().unwrap();
    app.wait_ready(job_id).await;

    let (status, text) = app.metrics_text().await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("flight_submissions_total"));
    assert!(text.contains("flight_completions_total"));
}
