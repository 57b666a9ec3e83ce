//! Adapter from transport errors to log calls.

use std::{
    error::Error,
    future::{ready, Ready},
    sync::Arc,
};

use axum::{
    error_handling::HandleErrorLayer,
    response::{IntoResponse, Response},
    BoxError,
};
use serde_json::Value;

use crate::http::problem::ProblemDetails;
use crate::logging::{LogContext, Logger};

const INTERNAL_ERROR_DETAIL: &str = "The server encountered an internal error";

/// Returns a callback that logs an error and answers with a generic 500.
///
/// The error's `Display` text is written once at error severity, together
/// with the request's logging fields. The response sink receives a
/// problem-details body that never includes the error text.
pub fn error_handler(
    log: Arc<dyn Logger>,
) -> impl Fn(&LogContext, &mut Response, &dyn Error) + Clone + Send + Sync + 'static {
    move |ctx: &LogContext, response: &mut Response, err: &dyn Error| {
        ctx.error(&*log, &err.to_string(), &[]);

        let request_id = ctx
            .get("reqID")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);

        *response = ProblemDetails::internal_error(INTERNAL_ERROR_DETAIL)
            .with_request_id(request_id)
            .into_response();
    }
}

/// [`error_handler`] packaged for fallible tower middleware on a router.
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(
///         ServiceBuilder::new()
///             .layer(error_layer(log.clone()))
///             .timeout(Duration::from_secs(30)),
///     )
///     .layer(request_id(RequestIdOptions::default()));
/// ```
///
/// Mount it inside the request-id layer so the logged fields carry `reqID`.
pub fn error_layer(
    log: Arc<dyn Logger>,
) -> HandleErrorLayer<
    impl Fn(LogContext, BoxError) -> Ready<Response> + Clone + Send + Sync + 'static,
    (LogContext,),
> {
    let handler = error_handler(log);
    HandleErrorLayer::new(move |ctx: LogContext, err: BoxError| {
        let mut response = Response::default();
        handler(&ctx, &mut response, &*err);
        ready(response)
    })
}
