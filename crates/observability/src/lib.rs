//! Observability wiring for all Mingle processes.

mod tracing_init;

pub use tracing_init::init;
