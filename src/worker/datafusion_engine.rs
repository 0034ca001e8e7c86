//! Production `ExecutionEngine` backed by an embedded DataFusion session.

use datafusion::prelude::SessionContext;
use futures::StreamExt;

use super::engine::{EngineError, ExecutionEngine, RecordBatchStream};
use arrow::datatypes::SchemaRef;

/// Wraps a fresh DataFusion `SessionContext` per call, per spec.md §4.4's
/// "no per-worker database connection pinning" rule: each job opens its own
/// execution context.
#[derive(Default)]
pub struct DataFusionEngine;

impl DataFusionEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ExecutionEngine for DataFusionEngine {
    async fn execute(&self, sql: &str) -> Result<(SchemaRef, RecordBatchStream), EngineError> {
        let ctx = SessionContext::new();
        let df = ctx
            .sql(sql)
            .await
            .map_err(|e| EngineError::Rejected(e.to_string()))?;

        let schema: SchemaRef = std::sync::Arc::new(df.schema().into());

        let stream = df
            .execute_stream()
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))?
            .map(|batch| batch.map_err(|e| EngineError::Failed(e.to_string())))
            .boxed();

        Ok((schema, stream))
    }
}
