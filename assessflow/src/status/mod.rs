//! Live execution status for polling and streaming clients.
//!
//! This module provides:
//! - [`StatusStore`]: per-execution copy-on-write snapshots, task handles
//!   and cancellation tokens, with retention-based garbage collection
//! - [`TaskHandle`], [`StatusSnapshot`] and [`ProgressUpdate`] projections

mod handle;
mod store;

pub use handle::{ProgressUpdate, StatusSnapshot, TaskHandle};
pub use store::StatusStore;
