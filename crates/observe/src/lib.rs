//! Initialization of logging and metrics shared by the price services.
pub mod metrics;
pub mod tracing;
