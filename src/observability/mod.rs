//! Observability subsystem for simplestore
//!
//! Structured JSON logging only; this crate has no metrics or tracing
//! surface. Logging is read-only with respect to store state and never
//! affects the outcome of an operation.

mod logger;

pub use logger::{Logger, Severity};
