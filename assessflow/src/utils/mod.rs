//! Timestamp helpers shared by the domain model and the status store.

pub mod timestamps;

pub use timestamps::{elapsed_ms, iso_timestamp, now_utc, Timestamp};
