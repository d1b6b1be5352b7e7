//! Prometheus remote-write adapter for PostgreSQL.
//!
//! Decoded batches pass a leadership gate ([`WriteCoordinator`]) before the
//! [`BatchWriter`] stages, deduplicates and inserts them. Redundant instances
//! elect a single writer through a PostgreSQL advisory lock or an external
//! decision endpoint.

mod adapter;
mod config;
mod constants;
mod election;
mod errors;
mod ingest;
mod liveness;
mod metrics;
mod server;
mod storage;
mod throughput;
pub(crate) mod utils;

pub mod proto;

pub use adapter::*;
pub use config::*;
pub use constants::METRIC_NAME_LABEL;
pub use election::*;
pub use errors::*;
pub use ingest::*;
pub use liveness::*;
pub use metrics::*;
pub use proto::decode_write_request;
pub use server::*;
pub use storage::*;
pub use throughput::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
