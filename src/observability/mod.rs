//! Observability for the bus connection
//!
//! Structured logging through `tracing`, configured from the environment.

pub mod logging;

pub use logging::{LogFormat, LoggingSettings, init_default_logging, init_logging};

// Span macros for structured logging
pub use logging::{connection_span, lifecycle_span};
