//! Reads only the schema message at the head of an Arrow IPC stream,
//! without decoding the record-batch body (spec.md §4.5: `schema` is
//! constant-time in result size).
//!
//! Mirrors the worker pool's async-stream/sync-reader bridge in reverse:
//! an async task forwards chunks from the `ByteStream` into a bounded
//! channel; a `spawn_blocking` task drives the (synchronous) Arrow
//! `StreamReader` via `blocking_recv`, and returns as soon as the schema
//! message has been parsed, Its producer task is then abandoned.

use std::io::{self, Read};

use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::StreamReader;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::artifact_store::{ArtifactStoreError, ByteStream};

struct ChannelReader {
    rx: mpsc::Receiver<Bytes>,
    current: Bytes,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.current.is_empty() {
                let n = buf.len().min(self.current.len());
                buf[..n].copy_from_slice(&self.current[..n]);
                self.current = self.current.slice(n..);
                return Ok(n);
            }
            match self.rx.blocking_recv() {
                Some(chunk) => self.current = chunk,
                None => return Ok(0),
            }
        }
    }
}

pub async fn read_ipc_stream_schema(mut stream: ByteStream) -> Result<SchemaRef, ArtifactStoreError> {
    let (tx, rx) = mpsc::channel::<Bytes>(4);

    let pump = tokio::spawn(async move {
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    if tx.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let result = tokio::task::spawn_blocking(move || {
        let reader = StreamReader::try_new(ChannelReader { rx, current: Bytes::new() }, None)?;
        Ok::<SchemaRef, arrow::error::ArrowError>(reader.schema())
    })
    .await;

    pump.abort();

    match result {
        Ok(Ok(schema)) => Ok(schema),
        Ok(Err(e)) => Err(ArtifactStoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))),
        Err(join_err) => Err(ArtifactStoreError::Io(io::Error::new(io::ErrorKind::Other, join_err.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::writer::StreamWriter;
    use arrow::record_batch::RecordBatch;
    use futures::stream;
    use std::sync::Arc;

    fn arrow_ipc_bytes(schema: &Schema, batches: &[RecordBatch]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buf, schema).unwrap();
            for batch in batches {
                writer.write(batch).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn reads_schema_without_the_full_body() {
        let schema = Schema::new(vec![Field::new("result", DataType::Int32, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema.clone()),
            vec![Arc::new(Int32Array::from(vec![1, 2, 3]))],
        )
        .unwrap();
        let bytes = arrow_ipc_bytes(&schema, &[batch]);

        let chunk_stream: ByteStream = stream::once(async move { Ok(Bytes::from(bytes)) }).boxed();
        let parsed = read_ipc_stream_schema(chunk_stream).await.unwrap();

        assert_eq!(parsed.field(0).name(), "result");
    }

    #[tokio::test]
    async fn reads_schema_of_an_empty_result_set() {
        let schema = Schema::new(vec![Field::new("x", DataType::Int32, false)]);
        let bytes = arrow_ipc_bytes(&schema, &[]);

        let chunk_stream: ByteStream = stream::once(async move { Ok(Bytes::from(bytes)) }).boxed();
        let parsed = read_ipc_stream_schema(chunk_stream).await.unwrap();

        assert_eq!(parsed.fields().len(), 1);
    }
}
