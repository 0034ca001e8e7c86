//! Shared HTTP test harness: builds the Axum app over an in-memory registry
//! and artifact store with a `FakeEngine`, and drives requests through
//! `tower::ServiceExt::oneshot` rather than a bound TCP listener.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use flight_core::server::app::build_test_app;
use flight_core::worker::FakeEngine;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<FakeEngine>,
}

pub async fn spawn() -> TestApp {
    let engine = Arc::new(FakeEngine::new());
    let (router, _dispatcher) = build_test_app(engine.clone()).await.expect("build test app");
    TestApp { router, engine }
}

impl TestApp {
    pub async fn submit(&self, sql: &str) -> (StatusCode, serde_json::Value) {
        let body = serde_json::json!({ "sql": sql }).to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn status(&self, job_id: uuid::Uuid) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(format!("/query/{job_id}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn result_raw(&self, job_id: uuid::Uuid) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("GET")
            .uri(format!("/query/{job_id}/result"))
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    pub async fn schema(&self, job_id: uuid::Uuid) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(format!("/query/{job_id}/schema"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn health(&self) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn metrics_text(&self) -> (StatusCode, String) {
        let request = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Poll `/query/{job_id}` until it reaches a terminal status.
    pub async fn wait_ready(&self, job_id: uuid::Uuid) -> serde_json::Value {
        for _ in 0..200 {
            let (_, body) = self.status(job_id).await;
            let status = body["status"].as_str().unwrap_or_default();
            if status == "ready" || status == "error" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }
}

#[allow(dead_code)]
pub fn parse<T: DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).expect("response shape")
}

/// A one-row, one-column `RecordBatch` fixture shared by scenario tests.
#[allow(dead_code)]
pub fn trivial_batch() -> arrow::record_batch::RecordBatch {
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    let schema = std::sync::Arc::new(Schema::new(vec![Field::new("result", DataType::Int32, false)]));
    arrow::record_batch::RecordBatch::try_new(schema, vec![std::sync::Arc::new(Int32Array::from(vec![2]))]).unwrap()
}
