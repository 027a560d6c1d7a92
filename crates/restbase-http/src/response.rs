//! The JSON error response envelope.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};

/// A rendered error: status, extra headers, and a mutable JSON object body.
///
/// Serialized as `application/json`.
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use restbase_http::response::ErrorResponse;
///
/// let mut resp = ErrorResponse::detail(StatusCode::NOT_FOUND, "Not found.");
/// resp.insert("errors", serde_json::json!([]));
/// assert_eq!(resp.body["detail"], "Not found.");
/// assert!(resp.body.contains_key("errors"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    /// Response status.
    pub status: StatusCode,
    /// Headers added on top of `Content-Type`.
    pub headers: HeaderMap,
    /// The JSON object body.
    pub body: Map<String, Value>,
}

impl ErrorResponse {
    /// An empty body with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Map::new(),
        }
    }

    /// The `{"detail": message}` body.
    pub fn detail(status: StatusCode, message: impl Into<String>) -> Self {
        let mut resp = Self::new(status);
        resp.insert("detail", Value::String(message.into()));
        resp
    }

    /// Builds a response from an arbitrary body object.
    pub fn with_body(status: StatusCode, body: Map<String, Value>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Sets a body key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.body.insert(key.into(), value)
    }

    /// Adds a header. Values that aren't valid header text are skipped.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Json(Value::Object(self.body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detail_body() {
        let resp = ErrorResponse::detail(StatusCode::FORBIDDEN, "Nope.");
        assert_eq!(Value::Object(resp.body), json!({"detail": "Nope."}));
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn test_insert_overwrites() {
        let mut resp = ErrorResponse::new(StatusCode::BAD_REQUEST);
        resp.insert("errors", json!(["old"]));
        let previous = resp.insert("errors", json!(["new"]));
        assert_eq!(previous, Some(json!(["old"])));
        assert_eq!(resp.body["errors"], json!(["new"]));
    }

    #[test]
    fn test_with_header_skips_invalid_values() {
        let resp = ErrorResponse::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header(http::header::RETRY_AFTER, "30")
            .with_header(http::header::WWW_AUTHENTICATE, "bad\nvalue");
        assert_eq!(resp.headers.get(http::header::RETRY_AFTER).unwrap(), "30");
        assert!(resp.headers.get(http::header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_into_response_is_json() {
        let response = ErrorResponse::detail(StatusCode::NOT_FOUND, "Not found.")
            .with_header(http::header::HeaderName::from_static("x-trace"), "abc")
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get("x-trace").unwrap(), "abc");
    }
}
