//! End-to-end: a trivial submission reaches `ready` and is retrievable, and
//! resubmitting identical SQL after completion is a cache hit (spec.md §8).

mod common;

use axum::http::StatusCode;
use common::{spawn, trivial_batch};

#[tokio::test]
async fn trivial_submission_reaches_ready_and_streams_a_result() {
    let app = spawn().await;
    app.engine.register("SELECT 1 + 1 as result", vec![trivial_batch()]);

    let (status, body) = app.submit("SELECT 1 + 1 as result").await;
    assert_eq!(status, StatusCode::OK);
    let job_id: uuid::Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    let handle = app.wait_ready(job_id).await;
    assert_eq!(handle["status"], "ready");

    let (status, bytes) = app.result_raw(job_id).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!bytes.is_empty(), "arrow IPC stream bytes should be non-empty");

    let (status, schema_body) = app.schema(job_id).await;
    assert_eq!(status, StatusCode::OK);
    let columns = schema_body["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0]["name"], "result");
}

#[tokio::test]
async fn resubmitting_identical_sql_after_ready_is_a_cache_hit() {
    let app = spawn().await;
    app.engine.register("select 1", vec![trivial_batch()]);

    let (_, first) = app.submit("select 1").await;
    let first_id: uuid::Uuid = first["job_id"].as_str().unwrap().parse().unwrap();
    app.wait_ready(first_id).await;

    let (status, second) = app.submit("select 1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["job_id"], first["job_id"]);
    assert_eq!(second["status"], "ready");
}

#[tokio::test]
async fn whitespace_and_case_differences_still_fingerprint_identically() {
    let app = spawn().await;
    app.engine.register("select 1", vec![trivial_batch()]);

    let (_, first) = app.submit("select 1").await;
    let first_id: uuid::Uuid = first["job_id"].as_str().unwrap().parse().unwrap();
    app.wait_ready(first_id).await;

    // Same trimmed text, different surrounding whitespace.
    let (status, second) = app.submit("  select 1  ").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["job_id"], first["job_id"]);
}

#[tokio::test]
async fn unknown_job_id_is_a_404() {
    let app = spawn().await;
    let (status, body) = app.status(uuid::Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
