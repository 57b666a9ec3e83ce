//! HTTP utilities and middleware.
//!
//! This module provides the request-id tagging layer and the error adapter
//! shared by services built on axum.

pub mod error;
pub mod problem;
pub mod request_id;

pub use error::{error_handler, error_layer};
pub use problem::ProblemDetails;
pub use request_id::{
    request_id, RequestIdLayer, RequestIdOptions, TagRequestLayer, X_REQUEST_ID,
};
