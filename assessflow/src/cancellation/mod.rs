//! Cooperative cancellation for in-flight executions.
//!
//! Every execution owns one [`CancellationToken`]. The engine checks it
//! at stage boundaries and the component runner races it against each
//! attempt and each backoff sleep.

mod token;

pub use token::CancellationToken;
