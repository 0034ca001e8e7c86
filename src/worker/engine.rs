//! The `ExecutionEngine` boundary: the analytic SQL engine is a black box
//! that yields a schema and a stream of record batches (spec.md §1, §4.4).

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("query rejected: {0}")]
    Rejected(String),

    #[error("execution failed: {0}")]
    Failed(String),
}

pub type RecordBatchStream = BoxStream<'static, Result<RecordBatch, EngineError>>;

/// A streaming SQL execution context. Each call opens an independent
/// execution; the engine is assumed thread-safe for independent contexts but
/// not shared across workers (spec.md §4.4).
#[async_trait::async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<(SchemaRef, RecordBatchStream), EngineError>;
}

/// An in-process fake used by tests to exercise the worker pool's streaming
/// discipline without a real catalog. Queries are matched by exact text.
#[derive(Default)]
pub struct FakeEngine {
    fixtures: std::sync::Mutex<std::collections::HashMap<String, Vec<RecordBatch>>>,
    fail: std::sync::Mutex<std::collections::HashSet<String>>,
    partial_failures: std::sync::Mutex<std::collections::HashMap<String, Vec<RecordBatch>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sql: impl Into<String>, batches: Vec<RecordBatch>) {
        self.fixtures.lock().unwrap().insert(sql.into(), batches);
    }

    pub fn register_failure(&self, sql: impl Into<String>) {
        self.fail.lock().unwrap().insert(sql.into());
    }

    /// Registers a fixture that streams `batches` successfully and then
    /// yields an `Err` — a mid-stream engine failure, as opposed to
    /// `register_failure`'s up-front rejection.
    pub fn register_partial_failure(&self, sql: impl Into<String>, batches: Vec<RecordBatch>) {
        self.partial_failures.lock().unwrap().insert(sql.into(), batches);
    }
}

#[async_trait::async_trait]
impl ExecutionEngine for FakeEngine {
    async fn execute(&self, sql: &str) -> Result<(SchemaRef, RecordBatchStream), EngineError> {
        if self.fail.lock().unwrap().contains(sql) {
            return Err(EngineError::Failed(format!("no such relation for {sql}")));
        }

        if let Some(batches) = self.partial_failures.lock().unwrap().get(sql).cloned() {
            let schema: SchemaRef = batches
                .first()
                .map(|b| b.schema())
                .unwrap_or_else(|| Arc::new(arrow::datatypes::Schema::empty()));
            let ok_batches = futures::stream::iter(batches.into_iter().map(Ok));
            let failure = futures::stream::once(async {
                Err::<RecordBatch, EngineError>(EngineError::Failed("connection lost mid-stream".to_string()))
            });
            return Ok((schema, ok_batches.chain(failure).boxed()));
        }

        let batches = self
            .fixtures
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .ok_or_else(|| EngineError::Rejected(format!("unregistered fixture: {sql}")))?;

        let schema: SchemaRef = batches
            .first()
            .map(|b| b.schema())
            .unwrap_or_else(|| Arc::new(arrow::datatypes::Schema::empty()));

        let stream = futures::stream::iter(batches.into_iter().map(Ok)).boxed();
        Ok((schema, stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::TryStreamExt;

    fn trivial_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("result", DataType::Int32, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![2]))]).unwrap()
    }

    #[tokio::test]
    async fn fake_engine_replays_registered_fixture() {
        let engine = FakeEngine::new();
        engine.register("SELECT 1 + 1 as result", vec![trivial_batch()]);

        let (schema, mut stream) = engine.execute("SELECT 1 + 1 as result").await.unwrap();
        assert_eq!(schema.field(0).name(), "result");

        let mut batches = Vec::new();
        while let Some(batch) = stream.try_next().await.unwrap() {
            batches.push(batch);
        }
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 1);
    }

    #[tokio::test]
    async fn fake_engine_surfaces_registered_failure() {
        let engine = FakeEngine::new();
        engine.register_failure("SELECT * FROM does_not_exist");

        let result = engine.execute("SELECT * FROM does_not_exist").await;
        assert!(matches!(result, Err(EngineError::Failed(_))));
    }

    #[tokio::test]
    async fn fake_engine_streams_batches_then_fails_mid_stream() {
        let engine = FakeEngine::new();
        engine.register_partial_failure("select partial", vec![trivial_batch()]);

        let (_, mut stream) = engine.execute("select partial").await.unwrap();

        let first = stream.try_next().await;
        assert!(matches!(first, Ok(Some(_))), "the registered batch must stream successfully first");

        let second = stream.try_next().await;
        assert!(matches!(second, Err(EngineError::Failed(_))), "the stream must then fail");
    }

    #[tokio::test]
    async fn unregistered_query_is_rejected() {
        let engine = FakeEngine::new();
        let result = engine.execute("SELECT 42").await;
        assert!(matches!(result, Err(EngineError::Rejected(_))));
    }
}
