//! HTTP routes: a thin adapter over `Dispatcher` (spec.md §6).

pub mod health;
pub mod metrics;
pub mod query;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use query::{query_result_handler, query_schema_handler, query_status_handler, submit_query_handler};
