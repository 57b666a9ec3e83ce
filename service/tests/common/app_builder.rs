//! Test app builder that mirrors main.rs wiring.
//!
//! The layer order matches production: routes, then the error layer over a
//! timeout, then the request-id layer outermost.
//!
//! # Preset Builders
//!
//! - [`TestAppBuilder::minimal()`] - Test routes only, no middleware
//! - [`TestAppBuilder::full()`] - Request ids plus error handling with a short timeout

use std::{sync::Arc, time::Duration};

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use httpkit::{
    http::{error_layer, request_id, RequestIdOptions, TagRequestLayer},
    logging::{mock::RecordingLogger, LogContext, Logger},
};
use tower::ServiceBuilder;

/// Health check handler (mirrors main.rs)
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Echo the `reqID` seen by the handler, or `<none>` when absent.
async fn echo_request_id(ctx: LogContext) -> String {
    match ctx.get("reqID") {
        Some(value) => value.as_str().unwrap_or_default().to_string(),
        None => "<none>".to_string(),
    }
}

/// Return every logging field the handler can see.
async fn context_fields(ctx: LogContext) -> Json<serde_json::Value> {
    Json(serde_json::Value::Object(ctx.fields().clone()))
}

async fn sleep_for(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "slept"
}

async fn teapot() -> impl IntoResponse {
    (StatusCode::IM_A_TEAPOT, "short and stout")
}

/// Builder for test applications that mirrors main.rs wiring.
pub struct TestAppBuilder {
    request_id: Option<RequestIdOptions>,
    tag_only: bool,
    error_handling: Option<(Arc<dyn Logger>, Duration)>,
    outer_context: Option<LogContext>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: None,
            tag_only: false,
            error_handling: None,
            outer_context: None,
        }
    }

    // =========================================================================
    // Preset Builders
    // =========================================================================

    /// Routes only, no middleware.
    #[must_use]
    pub fn minimal() -> Self {
        Self::new()
    }

    /// Request ids with default options and error handling with a 50ms timeout.
    #[must_use]
    pub fn full(log: Arc<RecordingLogger>) -> Self {
        Self::new()
            .with_request_id(RequestIdOptions::default())
            .with_error_handling(log, Duration::from_millis(50))
    }

    // =========================================================================
    // Component Configuration
    // =========================================================================

    #[must_use]
    pub fn with_request_id(mut self, options: RequestIdOptions) -> Self {
        self.request_id = Some(options);
        self
    }

    /// Mount only the tagging step, with nothing assigning ids upstream.
    #[must_use]
    pub fn with_tag_only(mut self) -> Self {
        self.tag_only = true;
        self
    }

    #[must_use]
    pub fn with_error_handling(mut self, log: Arc<dyn Logger>, timeout: Duration) -> Self {
        self.error_handling = Some((log, timeout));
        self
    }

    /// Insert a logging context before the request-id layer runs.
    #[must_use]
    pub fn with_outer_context(mut self, ctx: LogContext) -> Self {
        self.outer_context = Some(ctx);
        self
    }

    /// Build the router.
    pub fn build(self) -> Router {
        let mut app = Router::new()
            .route("/health", get(health_check))
            .route("/echo", get(echo_request_id))
            .route("/context", get(context_fields))
            .route("/sleep/{ms}", get(sleep_for))
            .route("/teapot", get(teapot));

        if let Some((log, timeout)) = self.error_handling {
            app = app.layer(
                ServiceBuilder::new()
                    .layer(error_layer(log))
                    .timeout(timeout),
            );
        }

        if self.tag_only {
            app = app.layer(TagRequestLayer);
        }

        if let Some(options) = self.request_id {
            app = app.layer(request_id(options));
        }

        if let Some(ctx) = self.outer_context {
            app = app.layer(Extension(ctx));
        }

        app
    }
}
