//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::artifact_store::{ArtifactStore, InMemoryArtifactStore, ObjectStoreArtifactStore};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::registry::{JobRegistry, SqliteRegistry};
use crate::telemetry::InMemoryTelemetry;
use crate::worker::{DataFusionEngine, ExecutionEngine, WorkerPool};

use super::routes::{
    health_handler, metrics_handler, query_result_handler, query_schema_handler, query_status_handler,
    submit_query_handler,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub telemetry: Arc<InMemoryTelemetry>,
}

/// Build the production Axum application: a `SqliteRegistry`, an
/// S3-compatible `ObjectStoreArtifactStore`, a `DataFusionEngine`, and a
/// `WorkerPool` sized from configuration (spec.md §6, §4.4).
///
/// Runs Registry orphan reconciliation before returning, per spec.md §4.3.
pub async fn build_production_app(config: &Config) -> anyhow::Result<(Router, Arc<Dispatcher>)> {
    let registry: Arc<dyn JobRegistry> = Arc::new(SqliteRegistry::open(&config.registry_path).await?);
    let artifact_store: Arc<dyn ArtifactStore> = Arc::new(ObjectStoreArtifactStore::new(&config.object_store)?);
    let engine: Arc<dyn ExecutionEngine> = Arc::new(DataFusionEngine::new());
    build_app(config, registry, artifact_store, engine).await
}

/// Build the Axum application over arbitrary collaborators. Exposed
/// separately from `build_production_app` so tests can supply an
/// in-memory registry, store, and fake engine.
pub async fn build_app(
    config: &Config,
    registry: Arc<dyn JobRegistry>,
    artifact_store: Arc<dyn ArtifactStore>,
    engine: Arc<dyn ExecutionEngine>,
) -> anyhow::Result<(Router, Arc<Dispatcher>)> {
    let telemetry = Arc::new(InMemoryTelemetry::new());

    let worker_pool = WorkerPool::new(
        config.max_workers,
        config.queue_capacity,
        registry.clone(),
        artifact_store.clone(),
        engine,
        telemetry.clone(),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        artifact_store,
        worker_pool,
        telemetry.clone(),
        config.object_store.bucket.clone(),
    ));

    let reconciled = dispatcher.reconcile_orphans_on_startup().await?;
    if reconciled > 0 {
        tracing::warn!(count = reconciled, "reconciled orphaned jobs from a prior run");
    }

    let state = AppState {
        dispatcher: dispatcher.clone(),
        telemetry,
    };

    let cors = build_cors_layer(config);
    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .route("/query", post(submit_query_handler))
        .route("/query/:job_id", get(query_status_handler))
        .route("/query/:job_id/result", get(query_result_handler))
        .route("/query/:job_id/schema", get(query_schema_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        // Applied innermost-to-outermost as each `.layer` call wraps the
        // router built so far; `Set` must be outermost so `Trace` sees the
        // header it assigns, and `Propagate` copies it onto the response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(move |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(&request_id_header)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .with_state(state);

    Ok((router, dispatcher))
}

/// In-memory test harness: an `InMemoryArtifactStore`, an in-memory
/// `SqliteRegistry`, and the caller's engine (typically `FakeEngine`).
pub async fn build_test_app(engine: Arc<dyn ExecutionEngine>) -> anyhow::Result<(Router, Arc<Dispatcher>)> {
    let config = Config::test_default();
    let registry: Arc<dyn JobRegistry> = Arc::new(SqliteRegistry::open_in_memory().await?);
    let artifact_store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    build_app(&config, registry, artifact_store, engine).await
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let origin = if config.cors_origins.trim() == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    let methods: Vec<Method> = if config.cors_methods.trim() == "*" {
        vec![Method::GET, Method::POST]
    } else {
        config
            .cors_methods
            .split(',')
            .filter_map(|m| m.trim().parse().ok())
            .collect()
    };

    let headers: Vec<HeaderName> = if config.cors_headers.trim() == "*" {
        vec![HeaderName::from_static("content-type")]
    } else {
        config
            .cors_headers
            .split(',')
            .filter_map(|h| h.trim().parse().ok())
            .collect()
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(3600))
}
