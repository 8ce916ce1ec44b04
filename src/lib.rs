//! Statera - CQRS account ledger
//!
//! Keeps a durable command store (SQLite) and a searchable read projection
//! in sync through domain events, ingests CSV transaction batches, and
//! derives per-account summaries that are pushed to account holders.

pub mod aggregation;
pub mod bus;
pub mod config;
pub mod domain;
pub mod events;
pub mod ingest;
pub mod notify;
pub mod projector;
pub mod registry;
#[cfg(feature = "sqlite")]
pub mod runtime;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
