//! Common test utilities for integration tests.
//!
//! This module provides:
//!
//! - [`app_builder::TestAppBuilder`] - Build test Axum apps that mirror main.rs wiring
//! - [`server`] - Run a [`httpkit::GracefulListener`] on an ephemeral port with a
//!   manually triggered termination signal
//!
//! # App Builder Usage
//!
//! ```ignore
//! use crate::common::app_builder::TestAppBuilder;
//!
//! #[tokio::test]
//! async fn test_with_app() {
//!     let app = TestAppBuilder::full().build();
//!     // Use app.oneshot(...) to send requests
//! }
//! ```

#![allow(dead_code)]

pub mod app_builder;
pub mod server;
