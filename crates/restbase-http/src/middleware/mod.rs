//! Middleware framework for restbase.
//!
//! This module provides the [`Middleware`] trait and [`MiddlewarePipeline`].
//! Middleware components can intercept requests before they reach the routes,
//! responses before they are sent, and exceptions nothing else rendered.
//!
//! ## Middleware Execution Order
//!
//! Middleware is processed in order for requests (first added = first to
//! process) and in reverse order for responses and exceptions (first added =
//! last to process). This is the "onion" model.
//!
//! The whole pipeline is mounted into axum as a single layer with
//! [`run_pipeline`].

pub mod builtin;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::HeaderValue;
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::Instrument;

use restbase_core::error::{CoreError, CoreResult};
use restbase_core::logging::request_span;
use restbase_core::Settings;

use crate::exception::{Exception, RaisedException};
use crate::layer::REQUEST_ID_HEADER;
use crate::response::ErrorResponse;

use self::builtin::{
    AllowedHostsMiddleware, CorsMiddleware, SecurityMiddleware, UnhandledExceptionsMiddleware,
    XFrameOptionsMiddleware,
};

/// Body detail of the pipeline's last-resort 500.
pub const SERVER_ERROR_DETAIL: &str = "A server error occurred.";

/// What response and exception hooks can see of the request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// The id of the request span.
    pub request_id: String,
}

impl RequestHead {
    /// Snapshots the head of `request`.
    pub fn from_request(request: &Request, request_id: impl Into<String>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            request_id: request_id.into(),
        }
    }

    /// The request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// A header value, if present and valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A middleware component that can process requests, responses, and
/// exceptions.
///
/// Each middleware can:
/// - Inspect or modify the request before it reaches the routes (`process_request`)
/// - Inspect or modify the response on the way out (`process_response`)
/// - Answer an exception no handler rendered (`process_exception`)
///
/// Every hook has a pass-through default.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use axum::extract::Request;
/// use axum::response::Response;
/// use restbase_http::middleware::{Middleware, MiddlewarePipeline, RequestHead};
///
/// struct PoweredBy;
///
/// #[async_trait]
/// impl Middleware for PoweredBy {
///     async fn process_response(&self, _head: &RequestHead, mut response: Response) -> Response {
///         response.headers_mut().insert("x-powered-by", "restbase".parse().unwrap());
///         response
///     }
/// }
///
/// let mut pipeline = MiddlewarePipeline::new();
/// pipeline.add(PoweredBy);
/// assert_eq!(pipeline.len(), 1);
/// ```
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process an incoming request before it reaches the routes.
    ///
    /// Return `Some(Response)` to short-circuit the pipeline. Return `None`
    /// to let the request continue.
    async fn process_request(&self, _request: &mut Request) -> Option<Response> {
        None
    }

    /// Process the response. Called in reverse middleware order.
    async fn process_response(&self, _head: &RequestHead, response: Response) -> Response {
        response
    }

    /// Handle an exception that no exception handler rendered.
    ///
    /// Return `Some(Response)` to answer it. Return `None` to let the next
    /// middleware (in reverse order) try.
    async fn process_exception(
        &self,
        _head: &RequestHead,
        _exception: &Exception,
    ) -> Option<Response> {
        None
    }
}

/// A pipeline of middleware components that processes requests and responses.
///
/// # Examples
///
/// ```
/// use restbase_http::middleware::MiddlewarePipeline;
/// use restbase_http::middleware::builtin::SecurityMiddleware;
///
/// let mut pipeline = MiddlewarePipeline::new();
/// pipeline.add(SecurityMiddleware::default());
/// ```
pub struct MiddlewarePipeline {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl Default for MiddlewarePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewarePipeline {
    /// Creates a new empty middleware pipeline.
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Builds the pipeline named by `settings.middleware`, in order.
    ///
    /// Unknown names are a configuration error.
    pub fn from_settings(settings: &Settings) -> CoreResult<Self> {
        let mut pipeline = Self::new();
        for name in &settings.middleware {
            match name.as_str() {
                "security" => pipeline.add(SecurityMiddleware::from_settings(&settings.security)),
                "cors" => pipeline.add(CorsMiddleware::from_settings(&settings.cors)),
                "allowed_hosts" => pipeline.add(AllowedHostsMiddleware::from_settings(settings)),
                "x_frame_options" => pipeline.add(XFrameOptionsMiddleware::new(
                    settings.security.x_frame_options.clone(),
                )),
                "unhandled_exceptions" => {
                    pipeline.add(UnhandledExceptionsMiddleware::new(settings.debug));
                }
                other => {
                    return Err(CoreError::ImproperlyConfigured(format!(
                        "Unknown middleware '{other}'"
                    )))
                }
            }
        }
        Ok(pipeline)
    }

    /// Adds a middleware to the end of the pipeline.
    pub fn add(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Returns the number of middleware components in the pipeline.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the pipeline has no middleware components.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Processes a request through the pipeline and the `inner` service.
    ///
    /// 1. Calls `process_request` on each middleware in order. If any returns
    ///    `Some(response)`, short-circuits and runs `process_response` in
    ///    reverse on only the middleware that already ran.
    /// 2. Calls `inner`.
    /// 3. If the response still carries an unhandled exception, calls
    ///    `process_exception` in reverse order; the first answer wins, and
    ///    without one the pipeline answers a 500.
    /// 4. Calls `process_response` on each middleware in reverse order.
    ///
    /// Everything runs inside a `request` span.
    pub async fn process<F, Fut>(&self, request: Request, inner: F) -> Response
    where
        F: FnOnce(Request) -> Fut + Send,
        Fut: Future<Output = Response> + Send,
    {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string);
        let span = request_span(&request_id);

        async move {
            let mut response = self.process_inner(request, &request_id, inner).await;
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            tracing::debug!(status = response.status().as_u16(), "request finished");
            response
        }
        .instrument(span)
        .await
    }

    async fn process_inner<F, Fut>(&self, mut request: Request, request_id: &str, inner: F) -> Response
    where
        F: FnOnce(Request) -> Fut + Send,
        Fut: Future<Output = Response> + Send,
    {
        // Phase 1: process_request (forward order)
        for (i, mw) in self.middlewares.iter().enumerate() {
            if let Some(response) = mw.process_request(&mut request).await {
                let head = RequestHead::from_request(&request, request_id);
                let mut resp = response;
                for j in (0..=i).rev() {
                    resp = self.middlewares[j].process_response(&head, resp).await;
                }
                return resp;
            }
        }

        // Phase 2: the inner service
        let head = RequestHead::from_request(&request, request_id);
        let mut resp = inner(request).await;

        // Phase 3: process_exception (reverse order)
        if let Some(raised) = resp.extensions().get::<RaisedException>().cloned() {
            resp = self.process_exception(&head, raised.exception()).await;
        }

        // Phase 4: process_response (reverse order)
        for mw in self.middlewares.iter().rev() {
            resp = mw.process_response(&head, resp).await;
        }

        resp
    }

    async fn process_exception(&self, head: &RequestHead, exception: &Exception) -> Response {
        for mw in self.middlewares.iter().rev() {
            if let Some(response) = mw.process_exception(head, exception).await {
                return response;
            }
        }

        tracing::error!(
            error = %exception,
            category = exception.category(),
            method = %head.method,
            path = head.path(),
            "unhandled exception reached the end of the middleware pipeline"
        );
        ErrorResponse::detail(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_DETAIL).into_response()
    }
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("middleware_count", &self.middlewares.len())
            .finish()
    }
}

/// Runs the shared pipeline around the rest of the axum stack.
pub async fn run_pipeline(
    State(pipeline): State<Arc<MiddlewarePipeline>>,
    request: Request,
    next: Next,
) -> Response {
    pipeline.process(request, |req| next.run(req)).await
}
