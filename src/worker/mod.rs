//! Worker Pool — bounded FIFO pool that streams execution results into the
//! Artifact Store (spec.md §4.4).
//!
//! Each job is written to its artifact as it is read from the engine: the
//! Arrow IPC stream writer is backed by a `Write` impl that forwards the
//! exact bytes the writer produces into a channel consumed by
//! `ArtifactStore::put_stream`, so the full result is never buffered in
//! memory. Reading the engine's async batch stream and driving the
//! (synchronous) Arrow writer happen on different sides of a
//! `spawn_blocking` boundary, bridged by `tokio::sync::mpsc`'s
//! blocking-aware `blocking_send`/`blocking_recv`.

pub mod datafusion_engine;
pub mod engine;

pub use engine::{EngineError, ExecutionEngine, FakeEngine, RecordBatchStream};

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact_store::{ArtifactStore, ArtifactStoreError};
use crate::error::ErrorCode;
use crate::registry::{JobRegistry, JobStatus, TransitionPatch};
use crate::telemetry::Telemetry;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool queue is saturated")]
    Overloaded,
}

/// A unit of work handed from the Dispatcher to the pool (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_id: Uuid,
    pub sql: String,
    pub fingerprint: String,
    pub artifact_key: String,
}

/// A fixed-size FIFO pool of workers streaming query results into the
/// Artifact Store. `submit` never blocks: it fails fast with `Overloaded`
/// once the bounded queue is full, per spec.md §5.
pub struct WorkerPool {
    tx: mpsc::Sender<WorkItem>,
    shutting_down: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    in_flight: Arc<StdMutex<HashSet<Uuid>>>,
    worker_handles: StdMutex<Vec<JoinHandle<()>>>,
    registry: Arc<dyn JobRegistry>,
}

impl WorkerPool {
    /// Spawn `size` workers pulling FIFO from a queue of capacity `queue_capacity`.
    pub fn new(
        size: usize,
        queue_capacity: usize,
        registry: Arc<dyn JobRegistry>,
        artifact_store: Arc<dyn ArtifactStore>,
        engine: Arc<dyn ExecutionEngine>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));

        let pool = Arc::new(Self {
            tx,
            shutting_down: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
            worker_handles: StdMutex::new(Vec::new()),
            registry: registry.clone(),
        });

        let mut handles = Vec::with_capacity(size);
        for worker_index in 0..size {
            let rx = rx.clone();
            let registry = registry.clone();
            let artifact_store = artifact_store.clone();
            let engine = engine.clone();
            let telemetry = telemetry.clone();
            let active = pool.active.clone();
            let in_flight = pool.in_flight.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(item) = item else {
                        info!(worker_index, "worker pool channel closed, worker exiting");
                        break;
                    };

                    in_flight.lock().unwrap().insert(item.job_id);
                    active.fetch_add(1, Ordering::SeqCst);

                    if let Err(e) = run_job(
                        &item,
                        registry.as_ref(),
                        artifact_store.as_ref(),
                        engine.as_ref(),
                        telemetry.as_ref(),
                    )
                    .await
                    {
                        warn!(job_id = %item.job_id, error = %e, "job finished with an error");
                    }

                    in_flight.lock().unwrap().remove(&item.job_id);
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        // The handles live on the pool so `shutdown` can abort stragglers
        // after the grace period.
        *pool.worker_handles.lock().unwrap() = handles;

        pool
    }

    /// Enqueue a work item. Non-blocking: fails fast with `Overloaded` if
    /// the bounded queue is full or the pool is draining.
    pub fn submit(&self, item: WorkItem) -> Result<(), PoolError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(PoolError::Overloaded);
        }
        self.tx.try_send(item).map_err(|_| PoolError::Overloaded)
    }

    /// Current depth of the bounded submission queue.
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Number of workers currently processing a job.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reject new submissions, wait up to `grace` for active workers to
    /// finish, then abort any stragglers and mark their jobs `error(shutdown)`.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + grace;
        while self.active.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let stragglers: Vec<Uuid> = self.in_flight.lock().unwrap().iter().copied().collect();
        if !stragglers.is_empty() {
            warn!(count = stragglers.len(), "aborting workers still running past shutdown grace period");
        }

        for handle in self.worker_handles.lock().unwrap().drain(..) {
            handle.abort();
        }

        for job_id in stragglers {
            let patch = TransitionPatch {
                completed_at: Some(Utc::now()),
                error_code: Some(ErrorCode::Shutdown.as_str().to_string()),
                ..Default::default()
            };
            if let Err(e) = self
                .registry
                .transition(job_id, JobStatus::Running, JobStatus::Error, patch)
                .await
            {
                error!(job_id = %job_id, error = %e, "failed to mark aborted job as shutdown during drain");
            }
        }
    }
}

#[derive(Error, Debug)]
enum JobRunError {
    #[error("registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Forwards each byte slice the Arrow `StreamWriter` emits into a channel
/// consumed by `ArtifactStore::put_stream`. Intended to run inside
/// `spawn_blocking`, where `blocking_send` is the sanctioned bridge back
/// into async code (spec.md §4.4 step 4-6).
struct ChunkWriter {
    tx: mpsc::Sender<Result<Bytes, ArtifactStoreError>>,
    bytes_written: u64,
}

impl io::Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "artifact upload receiver dropped"))?;
        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The per-job algorithm of spec.md §4.4.
async fn run_job(
    item: &WorkItem,
    registry: &dyn JobRegistry,
    artifact_store: &dyn ArtifactStore,
    engine: &dyn ExecutionEngine,
    telemetry: &dyn Telemetry,
) -> Result<(), JobRunError> {
    let claimed = registry
        .transition(item.job_id, JobStatus::Pending, JobStatus::Running, TransitionPatch::default())
        .await?;
    if !claimed {
        info!(job_id = %item.job_id, "job no longer pending, a worker will not claim it");
        return Ok(());
    }

    let (schema, mut batch_stream) = match engine.execute(&item.sql).await {
        Ok(v) => v,
        Err(e) => {
            fail_job(registry, item.job_id, ErrorCode::ExecutionFailed, telemetry).await?;
            return Err(JobRunError::Execution(e.to_string()));
        }
    };

    let (batch_tx, mut batch_rx) = mpsc::channel::<RecordBatch>(4);
    let (chunk_tx, chunk_rx) = mpsc::channel::<Result<Bytes, ArtifactStoreError>>(4);
    let abort_tx = chunk_tx.clone();
    let reader_failed = Arc::new(AtomicBool::new(false));

    let reader_failed_for_reader = reader_failed.clone();
    let reader_task: JoinHandle<Result<(), EngineError>> = tokio::spawn(async move {
        while let Some(batch) = batch_stream.next().await {
            match batch {
                Ok(batch) => {
                    if batch_tx.send(batch).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // A mid-stream engine error must abort the upload rather
                    // than let the writer finish and durably publish a
                    // complete-but-truncated artifact (spec.md §4.4 step 7).
                    reader_failed_for_reader.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }
        Ok(())
    });

    let write_schema = schema.clone();
    let reader_failed_for_writer = reader_failed.clone();
    let writer_task: JoinHandle<Result<(u64, u64), io::Error>> = tokio::task::spawn_blocking(move || {
        let chunk_writer = ChunkWriter {
            tx: chunk_tx,
            bytes_written: 0,
        };
        let mut writer = StreamWriter::try_new(chunk_writer, write_schema.as_ref())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let mut row_count: u64 = 0;

        while let Some(batch) = batch_rx.blocking_recv() {
            row_count += batch.num_rows() as u64;
            writer
                .write(&batch)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        }

        if reader_failed_for_writer.load(Ordering::SeqCst) {
            // Do not call `finish()`: that would write a valid end-of-stream
            // marker and let `put_stream` publish a truncated artifact.
            // Forward an error chunk instead so the uploader aborts.
            let _ = abort_tx.blocking_send(Err(ArtifactStoreError::UploadAborted(
                "engine execution failed mid-stream".to_string(),
            )));
            return Err(io::Error::new(io::ErrorKind::Other, "aborted: engine failed mid-stream"));
        }

        writer
            .finish()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let bytes_written = writer.get_ref().bytes_written;
        Ok((row_count, bytes_written))
    });

    let upload_key = item.artifact_key.clone();
    let chunk_stream = ReceiverStream::new(chunk_rx).boxed();
    let upload_result = artifact_store.put_stream(&upload_key, chunk_stream).await;

    let reader_result = reader_task.await;
    let writer_result = writer_task.await;

    let (row_count, artifact_bytes) = match (reader_result, writer_result, upload_result) {
        (Ok(Ok(())), Ok(Ok((row_count, bytes_written))), Ok(uploaded_bytes)) => {
            debug_assert!(bytes_written == 0 || uploaded_bytes > 0);
            (row_count, uploaded_bytes)
        }
        (Ok(Err(engine_err)), _, _) => {
            fail_job(registry, item.job_id, ErrorCode::ExecutionFailed, telemetry).await?;
            return Err(JobRunError::Execution(engine_err.to_string()));
        }
        (_, Ok(Err(write_err)), _) => {
            fail_job(registry, item.job_id, ErrorCode::UploadFailed, telemetry).await?;
            return Err(JobRunError::Upload(write_err.to_string()));
        }
        (_, _, Err(upload_err)) => {
            fail_job(registry, item.job_id, ErrorCode::UploadFailed, telemetry).await?;
            return Err(JobRunError::Upload(upload_err.to_string()));
        }
        (Err(join_err), _, _) | (_, Err(join_err), _) => {
            fail_job(registry, item.job_id, ErrorCode::UploadFailed, telemetry).await?;
            return Err(JobRunError::Upload(join_err.to_string()));
        }
        _ => {
            fail_job(registry, item.job_id, ErrorCode::UploadFailed, telemetry).await?;
            return Err(JobRunError::Upload("inconsistent pipeline outcome".to_string()));
        }
    };

    let completed_at = Utc::now();
    let job = registry.get_job(item.job_id).await?;
    let patch = TransitionPatch {
        completed_at: Some(completed_at),
        row_count: Some(row_count as i64),
        artifact_bytes: Some(artifact_bytes as i64),
        error_code: None,
    };
    let transitioned = registry
        .transition(item.job_id, JobStatus::Running, JobStatus::Ready, patch)
        .await?;

    if transitioned {
        telemetry.record_completion();
        telemetry.observe_execution_bytes(artifact_bytes);
        if let Some(job) = job {
            let latency = completed_at.signed_duration_since(job.created_at);
            if let Ok(latency) = latency.to_std() {
                telemetry.observe_submit_to_ready(latency);
            }
        }
    }

    Ok(())
}

async fn fail_job(
    registry: &dyn JobRegistry,
    job_id: Uuid,
    code: ErrorCode,
    telemetry: &dyn Telemetry,
) -> Result<(), JobRunError> {
    let patch = TransitionPatch {
        completed_at: Some(Utc::now()),
        error_code: Some(code.as_str().to_string()),
        ..Default::default()
    };
    registry
        .transition(job_id, JobStatus::Running, JobStatus::Error, patch)
        .await?;
    telemetry.record_error(code);
    Ok(())
}
