//! Shared types for the reduce side of distributed query execution:
//! row/datum model, identifiers, the engine-wide error type, configuration,
//! and per-query context with cooperative cancellation.

pub mod cancel;
pub mod config;
pub mod datum;
pub mod error;
pub mod request_context;
pub mod types;
