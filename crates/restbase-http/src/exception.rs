//! The exception taxonomy raised by request handlers.
//!
//! Handlers return `Result<T, Exception>`. An [`Exception`] is one of:
//!
//! - [`Exception::Api`] - the framework's HTTP errors ([`ApiException`]);
//! - [`Exception::Domain`] - a member of the domain-error family;
//! - [`Exception::Unhandled`] - anything else.
//!
//! Turning an `Exception` into a response does not render it. The response is
//! a placeholder 500 marked with a [`RaisedException`]; the API exception
//! layer picks it up and asks the configured handler to render it.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use restbase_core::domain::{
    AccessDenied, BusinessRuleViolation, DomainFailure, ResourceConflict, ResourceNotFound,
    ValidationDomainError,
};
use restbase_core::DomainError;

/// HTTP errors raised by the framework itself. None of them is a domain error.
///
/// # Examples
///
/// ```
/// use restbase_http::exception::ApiException;
///
/// let err = ApiException::Throttled { wait: Some(3) };
/// assert_eq!(err.status_code().as_u16(), 429);
/// assert_eq!(err.to_string(), "Request was throttled. Expected available in 3 seconds.");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiException {
    /// The request body could not be parsed.
    #[error("{0}")]
    ParseError(String),

    /// Serializer-level validation failed; maps field names to messages.
    #[error("Invalid input.")]
    Validation(BTreeMap<String, Vec<String>>),

    /// Credentials were supplied but rejected.
    #[error("{0}")]
    AuthenticationFailed(String),

    /// No credentials were supplied.
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    /// The caller lacks permission.
    #[error("{0}")]
    PermissionDenied(String),

    /// The resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The HTTP method is not allowed for the resource.
    #[error("Method \"{0}\" not allowed.")]
    MethodNotAllowed(String),

    /// No representation matches the `Accept` header.
    #[error("Could not satisfy the request Accept header.")]
    NotAcceptable,

    /// The request's content type is not supported.
    #[error("Unsupported media type \"{0}\" in request.")]
    UnsupportedMediaType(String),

    /// Rate limit exceeded; `wait` is the retry delay in seconds.
    #[error("{}", throttled_detail(.wait))]
    Throttled {
        /// Seconds until the next request is allowed, when known.
        wait: Option<u64>,
    },
}

#[allow(clippy::ref_option)]
fn throttled_detail(wait: &Option<u64>) -> String {
    match wait {
        Some(1) => "Request was throttled. Expected available in 1 second.".to_string(),
        Some(secs) => format!("Request was throttled. Expected available in {secs} seconds."),
        None => "Request was throttled.".to_string(),
    }
}

impl ApiException {
    /// A parse error with the default message.
    pub fn parse_error() -> Self {
        Self::ParseError("Malformed request.".to_string())
    }

    /// An authentication failure with the default message.
    pub fn authentication_failed() -> Self {
        Self::AuthenticationFailed("Incorrect authentication credentials.".to_string())
    }

    /// A permission error with the default message.
    pub fn permission_denied() -> Self {
        Self::PermissionDenied("You do not have permission to perform this action.".to_string())
    }

    /// A not-found error with the default message.
    pub fn not_found() -> Self {
        Self::NotFound("Not found.".to_string())
    }

    /// A validation error for a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), vec![message.into()]);
        Self::Validation(fields)
    }

    /// Returns the HTTP status code for this exception.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ParseError(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailed(_) | Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// A short, stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "parse_error",
            Self::Validation(_) => "invalid",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::NotAuthenticated => "not_authenticated",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::NotAcceptable => "not_acceptable",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Throttled { .. } => "throttled",
        }
    }
}

/// Anything a request handler can raise.
#[derive(Error, Debug)]
pub enum Exception {
    /// A framework HTTP error.
    #[error(transparent)]
    Api(#[from] ApiException),

    /// A member of the domain-error family.
    #[error("{0}")]
    Domain(Box<dyn DomainError>),

    /// An error the base converter does not recognize.
    #[error("{0}")]
    Unhandled(Box<dyn std::error::Error + Send + Sync>),
}

impl Exception {
    /// Wraps any domain error, including types defined outside this workspace.
    pub fn domain(error: impl DomainError) -> Self {
        Self::Domain(Box::new(error))
    }

    /// Wraps an arbitrary error as unhandled.
    pub fn unhandled(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unhandled(error.into())
    }

    /// Returns the domain error when this exception belongs to the family.
    pub fn as_domain(&self) -> Option<&dyn DomainError> {
        match self {
            Self::Domain(err) => Some(err.as_ref()),
            Self::Api(_) | Self::Unhandled(_) => None,
        }
    }

    /// Returns `true` for members of the domain-error family.
    pub fn is_domain(&self) -> bool {
        self.as_domain().is_some()
    }

    /// Returns the API exception, if this is one.
    pub const fn as_api(&self) -> Option<&ApiException> {
        match self {
            Self::Api(err) => Some(err),
            Self::Domain(_) | Self::Unhandled(_) => None,
        }
    }

    /// A short label for the arm, used in logs.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Api(_) => "api",
            Self::Domain(_) => "domain",
            Self::Unhandled(_) => "unhandled",
        }
    }
}

impl From<Box<dyn DomainError>> for Exception {
    fn from(error: Box<dyn DomainError>) -> Self {
        Self::Domain(error)
    }
}

macro_rules! domain_exception_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for Exception {
                fn from(error: $ty) -> Self {
                    Self::Domain(Box::new(error))
                }
            }
        )+
    };
}

domain_exception_from!(
    ValidationDomainError,
    BusinessRuleViolation,
    ResourceNotFound,
    ResourceConflict,
    AccessDenied,
    DomainFailure,
);

/// Response extension marking a response produced from a raised exception.
#[derive(Debug, Clone)]
pub struct RaisedException(pub Arc<Exception>);

impl RaisedException {
    /// The raised exception.
    pub fn exception(&self) -> &Exception {
        &self.0
    }
}

impl IntoResponse for Exception {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response
            .extensions_mut()
            .insert(RaisedException(Arc::new(self)));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restbase_core::domain::field_error;
    use restbase_core::DomainErrorKind;

    #[test]
    fn test_api_exception_status_codes() {
        assert_eq!(ApiException::parse_error().status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiException::NotAuthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiException::permission_denied().status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiException::not_found().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiException::MethodNotAllowed("PUT".into()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiException::Throttled { wait: None }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_api_exception_messages() {
        assert_eq!(ApiException::not_found().to_string(), "Not found.");
        assert_eq!(
            ApiException::MethodNotAllowed("DELETE".into()).to_string(),
            "Method \"DELETE\" not allowed."
        );
        assert_eq!(
            ApiException::Throttled { wait: Some(1) }.to_string(),
            "Request was throttled. Expected available in 1 second."
        );
        assert_eq!(
            ApiException::Throttled { wait: None }.to_string(),
            "Request was throttled."
        );
    }

    #[test]
    fn test_api_exception_field() {
        let ApiException::Validation(fields) = ApiException::field("email", "Enter a valid email.")
        else {
            panic!("expected validation variant");
        };
        assert_eq!(fields["email"], vec!["Enter a valid email.".to_string()]);
    }

    #[test]
    fn test_domain_membership() {
        let exc: Exception = ValidationDomainError::new(vec![field_error("email", "invalid")]).into();
        assert!(exc.is_domain());
        assert_eq!(exc.as_domain().unwrap().kind(), DomainErrorKind::Validation);
        assert_eq!(exc.category(), "domain");

        let api: Exception = ApiException::not_found().into();
        assert!(!api.is_domain());
        assert!(api.as_api().is_some());

        let other = Exception::unhandled("boom");
        assert!(!other.is_domain());
        assert_eq!(other.to_string(), "boom");
    }

    #[test]
    fn test_into_response_marks_exception() {
        let response = Exception::from(ApiException::NotAuthenticated).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let raised = response.extensions().get::<RaisedException>().unwrap();
        assert!(matches!(
            raised.exception(),
            Exception::Api(ApiException::NotAuthenticated)
        ));
    }
}
