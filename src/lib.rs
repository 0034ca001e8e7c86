// Flight - cached SQL query-serving facade
//
// Clients submit a SQL string; the crate deduplicates it against in-flight
// and completed work by content address, runs it on a bounded worker pool,
// and persists the result as an Arrow IPC stream to an object store.
// Identical queries resolve to the same cached artifact without re-execution.
//
// The HTTP layer in `server` is a thin adapter over `Dispatcher`.

pub mod artifact_store;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fingerprint;
pub mod ipc;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod worker;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{DispatcherError, ErrorCode};
pub use fingerprint::fingerprint;
