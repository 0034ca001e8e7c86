//! End-to-end: a failing query surfaces as a terminal `error` status, and its
//! result/schema endpoints both refuse with `not_ready` (spec.md §4.4, §7, §8).

mod common;

use axum::http::StatusCode;
use common::spawn;

#[tokio::test]
async fn execution_failure_surfaces_as_error_status() {
    let app = spawn().await;
    app.engine.register_failure("SELECT * FROM does_not_exist");

    let (_, submitted) = app.submit("SELECT * FROM does_not_exist").await;
    let job_id: uuid::Uuid = submitted["job_id"].as_str().unwrap().parse().unwrap();

    let handle = app.wait_ready(job_id).await;
    assert_eq!(handle["status"], "error");
}

#[tokio::test]
async fn result_and_schema_refuse_on_a_failed_job() {
    let app = spawn().await;
    app.engine.register_failure("SELECT * FROM does_not_exist");

    let (_, submitted) = app.submit("SELECT * FROM does_not_exist").await;
    let job_id: uuid::Uuid = submitted["job_id"].as_str().unwrap().parse().unwrap();
    app.wait_ready(job_id).await;

    let (status, _) = app.result_raw(job_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, schema_body) = app.schema(job_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(schema_body["error"], "not_ready");
}

#[tokio::test]
async fn unregistered_fixture_is_also_an_execution_failure() {
    // No register()/register_failure() call: FakeEngine rejects it as
    // unregistered, which the worker treats identically to a query the
    // engine itself rejected.
    let app = spawn().await;

    let (_, submitted) = app.submit("SELECT * FROM nowhere").await;
    let job_id: uuid::Uuid = submitted["job_id"].as_str().unwrap().parse().unwrap();

    let handle = app.wait_ready(job_id).await;
    assert_eq!(handle["status"], "error");
}
