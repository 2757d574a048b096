//! Observability setup for Mnemon.

pub mod tracing_setup;
