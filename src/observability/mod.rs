//! Observability: tracing subscriber setup.

mod tracing_init;

pub use tracing_init::{init_tracing, TracingError};
