//! Shared helpers for binaries and background workers.

pub mod bootstrap;
