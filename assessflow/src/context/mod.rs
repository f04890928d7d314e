//! Context handed to components on every invocation.
//!
//! This module provides:
//! - The subject context loaded once per execution
//! - Declared-dependency access to prior component payloads
//! - The per-invocation component context

mod component;
mod inputs;
mod subject;

pub use component::ComponentContext;
pub use inputs::ComponentInputs;
pub use subject::SubjectContext;
