//! Request-id middleware that tags the per-request logging context.
//!
//! [`request_id`] wraps tower-http's request-id layers. Identifier
//! assignment always runs before the tagging step, so by the time the
//! tagger sees a request the [`RequestId`] extension is in place. The
//! tagger copies it into a child [`LogContext`] under `reqID` and runs the
//! downstream handler inside a `request` tracing span.
//!
//! # Example
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use httpkit::http::{request_id, RequestIdOptions};
//! use httpkit::logging::LogContext;
//!
//! async fn handler(ctx: LogContext) -> String {
//!     ctx.get("reqID").map(ToString::to_string).unwrap_or_default()
//! }
//!
//! let app: Router = Router::new()
//!     .route("/", get(handler))
//!     .layer(request_id(RequestIdOptions::default()));
//! ```

use std::task::{Context, Poll};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower::{Layer, Service};
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestId, PropagateRequestIdLayer, RequestId, SetRequestId,
    SetRequestIdLayer,
};
use tracing::{instrument::Instrumented, Instrument};

use crate::logging::LogContext;

/// Header carrying the request identifier.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// How client-supplied identifiers are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestIdOptions {
    accept_client_id: bool,
    max_header_length: usize,
}

impl Default for RequestIdOptions {
    fn default() -> Self {
        Self {
            accept_client_id: true,
            max_header_length: 128,
        }
    }
}

impl RequestIdOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep an incoming `x-request-id` header instead of generating one.
    #[must_use]
    pub const fn accept_client_id(mut self, accept: bool) -> Self {
        self.accept_client_id = accept;
        self
    }

    /// Truncate client-supplied identifiers to `limit` bytes. 0 disables the limit.
    #[must_use]
    pub const fn max_header_length(mut self, limit: usize) -> Self {
        self.max_header_length = limit;
        self
    }

    #[must_use]
    pub const fn accepts_client_id(&self) -> bool {
        self.accept_client_id
    }

    #[must_use]
    pub const fn header_limit(&self) -> usize {
        self.max_header_length
    }

    /// Apply the options to an incoming request's headers.
    ///
    /// Rejected or empty identifiers are removed so the upstream layer
    /// generates a fresh one.
    pub fn sanitize(&self, headers: &mut HeaderMap) {
        if !self.accept_client_id {
            headers.remove(&X_REQUEST_ID);
            return;
        }

        let Some(value) = headers.get(&X_REQUEST_ID) else {
            return;
        };

        let bytes = value.as_bytes();
        if bytes.is_empty() {
            headers.remove(&X_REQUEST_ID);
            return;
        }

        let limit = self.max_header_length;
        if limit > 0 && bytes.len() > limit {
            let end = truncation_point(bytes, limit);
            // A non-empty prefix of a valid header value is itself valid.
            match HeaderValue::from_bytes(&bytes[..end]) {
                Ok(truncated) if end > 0 => {
                    headers.insert(X_REQUEST_ID.clone(), truncated);
                }
                _ => {
                    headers.remove(&X_REQUEST_ID);
                }
            }
        }
    }
}

/// Largest cut at or below `limit` that does not split a UTF-8 character.
///
/// Identifiers that are not UTF-8 are cut at `limit` exactly.
fn truncation_point(bytes: &[u8], limit: usize) -> usize {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return limit;
    };
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Build the request-id middleware stack.
#[must_use]
pub const fn request_id(options: RequestIdOptions) -> RequestIdLayer {
    RequestIdLayer { options }
}

/// Layer returned by [`request_id`].
#[derive(Debug, Clone)]
pub struct RequestIdLayer {
    options: RequestIdOptions,
}

impl<S> Layer<S> for RequestIdLayer {
    type Service =
        ClientRequestId<SetRequestId<PropagateRequestId<TagRequest<S>>, MakeRequestUuid>>;

    fn layer(&self, inner: S) -> Self::Service {
        let tagged = TagRequestLayer.layer(inner);
        let propagated = PropagateRequestIdLayer::new(X_REQUEST_ID.clone()).layer(tagged);
        let assigned =
            SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid).layer(propagated);
        ClientRequestId {
            inner: assigned,
            options: self.options,
        }
    }
}

/// Applies [`RequestIdOptions`] to the incoming header before assignment.
#[derive(Debug, Clone)]
pub struct ClientRequestId<S> {
    inner: S,
    options: RequestIdOptions,
}

impl<S, B> Service<Request<B>> for ClientRequestId<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        self.options.sanitize(req.headers_mut());
        self.inner.call(req)
    }
}

/// The tagging step on its own, for stacks that already assign request ids.
///
/// Must sit inside (be applied before) the layer that assigns the id. A
/// request that reaches it without a [`RequestId`] is tagged with an empty
/// `reqID`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagRequestLayer;

impl<S> Layer<S> for TagRequestLayer {
    type Service = TagRequest<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TagRequest { inner }
    }
}

/// Copies the assigned [`RequestId`] into the request's [`LogContext`].
#[derive(Debug, Clone)]
pub struct TagRequest<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for TagRequest<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Instrumented<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let req_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| String::from_utf8_lossy(id.header_value().as_bytes()).into_owned())
            .unwrap_or_default();

        let span = tracing::info_span!("request", reqID = %req_id);

        let ctx = req
            .extensions()
            .get::<LogContext>()
            .cloned()
            .unwrap_or_default()
            .with_field("reqID", req_id);
        req.extensions_mut().insert(ctx);

        self.inner.call(req).instrument(span)
    }
}
