#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

//! Helpers for axum services: an error-to-log adapter, request-id tagging
//! middleware and a graceful-shutdown listener loop.

pub mod config;
pub mod http;
pub mod listener;
pub mod logging;
pub mod signals;

pub use listener::{listen_gracefully, DrainError, GracefulListener};
pub use logging::{LogContext, Logger, TracingLogger};
pub use signals::Termination;
