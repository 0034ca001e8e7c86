//! End-to-end: concurrent submissions of identical SQL join to a single job
//! rather than each enrolling their own (spec.md §4.2, §8).

mod common;

use std::collections::HashSet;

use common::{spawn, trivial_batch};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn concurrent_identical_submissions_join_to_one_job() {
    let app = spawn().await;
    app.engine.register("select 1", vec![trivial_batch()]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = app.router.clone();
        handles.push(tokio::spawn(async move {
            use axum::body::Body;
            use axum::http::Request;
            use http_body_util::BodyExt;
            use tower::ServiceExt;

            let request = Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "sql": "select 1" }).to_string()))
                .unwrap();
            let response = router.oneshot(request).await.unwrap();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            body["job_id"].as_str().unwrap().to_string()
        }));
    }

    let job_ids: HashSet<String> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(job_ids.len(), 1, "all concurrent submissions must dedup to a single job id");
}

#[tokio::test]
async fn distinct_sql_text_never_dedups() {
    let app = spawn().await;
    app.engine.register("select 1", vec![trivial_batch()]);
    app.engine.register("select 2", vec![trivial_batch()]);

    let (_, a) = app.submit("select 1").await;
    let (_, b) = app.submit("select 2").await;
    assert_ne!(a["job_id"], b["job_id"]);
}
