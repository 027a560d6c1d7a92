//! The API exception layer.
//!
//! [`handle_api_exceptions`] is an axum middleware installed around the
//! routes. When a handler returns `Err(Exception)`, the response it produces
//! is a placeholder marked with [`RaisedException`]. This layer asks the
//! configured [`ExceptionHandler`] to render it; if the handler declines, the
//! marked placeholder continues outward to the middleware pipeline.
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{middleware, routing::get, Router};
//! use restbase_http::handler::custom_exception_handler;
//! use restbase_http::layer::{handle_api_exceptions, SharedExceptionHandler};
//!
//! let handler: SharedExceptionHandler = Arc::new(custom_exception_handler);
//! let router: Router = Router::new()
//!     .route("/", get(|| async { "ok" }))
//!     .layer(middleware::from_fn_with_state(handler, handle_api_exceptions));
//! ```

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::exception::RaisedException;
use crate::handler::{ExceptionContext, ExceptionHandler};

/// Header carrying the caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The handler as shared layer state.
pub type SharedExceptionHandler = Arc<dyn ExceptionHandler>;

/// Builds the context passed to the exception handler.
pub fn exception_context(request: &Request) -> ExceptionContext {
    let mut context = ExceptionContext::new(request.method().clone(), request.uri().path());
    if let Some(matched) = request.extensions().get::<MatchedPath>() {
        context = context.with_view(matched.as_str());
    }
    if let Some(id) = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        context = context.with_request_id(id);
    }
    context
}

/// Renders raised exceptions with the shared handler.
pub async fn handle_api_exceptions(
    State(handler): State<SharedExceptionHandler>,
    request: Request,
    next: Next,
) -> Response {
    let context = exception_context(&request);
    let response = next.run(request).await;

    let Some(raised) = response.extensions().get::<RaisedException>().cloned() else {
        return response;
    };

    match handler.handle(raised.exception(), &context) {
        Some(rendered) => {
            tracing::debug!(
                category = raised.exception().category(),
                status = rendered.status.as_u16(),
                path = %context.path,
                "exception rendered"
            );
            rendered.into_response()
        }
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use http::StatusCode;
    use restbase_core::domain::{field_error, ValidationDomainError};
    use tower::ServiceExt;

    use crate::exception::{ApiException, Exception};
    use crate::handler::custom_exception_handler;

    fn app() -> Router {
        let handler: SharedExceptionHandler = Arc::new(custom_exception_handler);
        Router::new()
            .route(
                "/domain",
                get(|| async {
                    Err::<(), _>(Exception::from(ValidationDomainError::new(vec![
                        field_error("email", "invalid"),
                    ])))
                }),
            )
            .route(
                "/api",
                get(|| async { Err::<(), _>(Exception::from(ApiException::not_found())) }),
            )
            .route(
                "/boom",
                get(|| async { Err::<(), _>(Exception::unhandled("boom")) }),
            )
            .route("/ok", get(|| async { "fine" }))
            .layer(axum::middleware::from_fn_with_state(
                handler,
                handle_api_exceptions,
            ))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_domain_exception_rendered_with_errors() {
        let response = app().oneshot(get_request("/domain")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<RaisedException>().is_none());
        let body = json_body(response).await;
        assert_eq!(body["errors"][0]["field"], "email");
    }

    #[tokio::test]
    async fn test_api_exception_rendered_without_errors() {
        let response = app().oneshot(get_request("/api")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body, serde_json::json!({"detail": "Not found."}));
    }

    #[tokio::test]
    async fn test_declined_exception_stays_marked() {
        let response = app().oneshot(get_request("/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<RaisedException>().is_some());
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let response = app().oneshot(get_request("/ok")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_exception_context_from_request() {
        let request = Request::builder()
            .method("DELETE")
            .uri("/orders/7?force=1")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .unwrap();
        let context = exception_context(&request);
        assert_eq!(context.method, http::Method::DELETE);
        assert_eq!(context.path, "/orders/7");
        assert_eq!(context.request_id.as_deref(), Some("req-42"));
        assert!(context.view.is_none());
    }
}
