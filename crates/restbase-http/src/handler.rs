//! Exception handlers: the base converter and the error response augmenter.
//!
//! An [`ExceptionHandler`] turns a raised [`Exception`] into an
//! [`ErrorResponse`], or declines with `None` so the exception keeps
//! propagating.
//!
//! - [`DefaultExceptionHandler`] (also [`exception_handler`]) is the base
//!   converter: it renders API and domain exceptions and declines the rest.
//! - [`ErrorAugmenter`] wraps any base converter. When the raised exception is
//!   a member of the domain-error family, it sets `body["errors"]` to the
//!   error's details. Everything else passes through unchanged.
//! - [`custom_exception_handler`] is the augmenter over the default base; it
//!   is what services install.
//!
//! # Examples
//!
//! ```
//! use restbase_core::domain::{field_error, ValidationDomainError};
//! use restbase_http::exception::Exception;
//! use restbase_http::handler::{custom_exception_handler, ExceptionContext};
//!
//! let exc = Exception::from(ValidationDomainError::new(vec![field_error("email", "invalid")]));
//! let resp = custom_exception_handler(&exc, &ExceptionContext::default()).unwrap();
//! assert_eq!(resp.status.as_u16(), 400);
//! assert_eq!(resp.body["errors"][0]["field"], "email");
//! ```

use http::header::{RETRY_AFTER, WWW_AUTHENTICATE};
use http::{Method, StatusCode};
use serde_json::{Map, Value};

use crate::exception::{ApiException, Exception};
use crate::response::ErrorResponse;

/// Body key the augmenter writes.
pub const ERRORS_KEY: &str = "errors";

/// Where an exception was raised. Opaque to the augmenter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionContext {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// The matched route, when routing got that far.
    pub view: Option<String>,
    /// The `x-request-id` of the request, if sent.
    pub request_id: Option<String>,
}

impl ExceptionContext {
    /// A context for `method path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            view: None,
            request_id: None,
        }
    }

    /// Sets the matched route.
    #[must_use]
    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Converts a raised exception into an error response.
///
/// Returning `None` means "not handled here": the exception keeps
/// propagating to the middleware pipeline. Any
/// `Fn(&Exception, &ExceptionContext) -> Option<ErrorResponse>` is a handler.
pub trait ExceptionHandler: Send + Sync {
    /// Renders `exception`, or declines with `None`.
    fn handle(&self, exception: &Exception, context: &ExceptionContext) -> Option<ErrorResponse>;
}

impl<F> ExceptionHandler for F
where
    F: Fn(&Exception, &ExceptionContext) -> Option<ErrorResponse> + Send + Sync,
{
    fn handle(&self, exception: &Exception, context: &ExceptionContext) -> Option<ErrorResponse> {
        self(exception, context)
    }
}

/// The base converter.
///
/// | exception | status | body |
/// |---|---|---|
/// | `Api(Validation(fields))` | 400 | `{field: [messages]}` |
/// | other `Api(e)` | `e.status_code()` | `{"detail": e}` |
/// | `Domain(e)` | `e.kind().status_code()` | `{"detail": e}` |
/// | `Unhandled(_)` | declined | |
#[derive(Debug, Clone, Default)]
pub struct DefaultExceptionHandler {
    auth_scheme: Option<String>,
}

impl DefaultExceptionHandler {
    /// Creates the base converter with no authentication scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `WWW-Authenticate: <scheme>` with 401 responses.
    #[must_use]
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = Some(scheme.into());
        self
    }

    fn render_api(&self, exc: &ApiException) -> ErrorResponse {
        let status = exc.status_code();
        let mut resp = match exc {
            ApiException::Validation(fields) => ErrorResponse::with_body(
                status,
                fields
                    .iter()
                    .map(|(field, messages)| {
                        let messages = messages.iter().cloned().map(Value::String).collect();
                        (field.clone(), Value::Array(messages))
                    })
                    .collect::<Map<String, Value>>(),
            ),
            _ => ErrorResponse::detail(status, exc.to_string()),
        };

        match exc {
            ApiException::Throttled { wait: Some(wait) } => {
                resp = resp.with_header(RETRY_AFTER, &wait.to_string());
            }
            ApiException::AuthenticationFailed(_) | ApiException::NotAuthenticated => {
                if let Some(scheme) = &self.auth_scheme {
                    resp = resp.with_header(WWW_AUTHENTICATE, scheme);
                }
            }
            _ => {}
        }
        resp
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn handle(&self, exception: &Exception, _context: &ExceptionContext) -> Option<ErrorResponse> {
        match exception {
            Exception::Api(exc) => Some(self.render_api(exc)),
            Exception::Domain(err) => {
                let status = StatusCode::from_u16(err.kind().status_code())
                    .unwrap_or(StatusCode::BAD_REQUEST);
                Some(ErrorResponse::detail(status, err.to_string()))
            }
            Exception::Unhandled(_) => None,
        }
    }
}

/// The base converter with default configuration.
pub fn exception_handler(exception: &Exception, context: &ExceptionContext) -> Option<ErrorResponse> {
    DefaultExceptionHandler::new().handle(exception, context)
}

/// Adds `errors` to the base converter's response for domain errors.
///
/// Status, headers and the other body keys are left exactly as the base
/// produced them. An `errors` key already present is overwritten for domain
/// errors and left alone for everything else.
#[derive(Debug, Clone, Default)]
pub struct ErrorAugmenter<H> {
    base: H,
}

impl<H> ErrorAugmenter<H>
where
    H: ExceptionHandler,
{
    /// Wraps `base`.
    pub const fn new(base: H) -> Self {
        Self { base }
    }

    /// The wrapped base converter.
    pub const fn base(&self) -> &H {
        &self.base
    }
}

impl<H> ExceptionHandler for ErrorAugmenter<H>
where
    H: ExceptionHandler,
{
    fn handle(&self, exception: &Exception, context: &ExceptionContext) -> Option<ErrorResponse> {
        let mut response = self.base.handle(exception, context)?;
        if let Some(err) = exception.as_domain() {
            response.insert(ERRORS_KEY, err.details_value());
        }
        Some(response)
    }
}

/// The augmenter over the default base converter.
pub fn custom_exception_handler(
    exception: &Exception,
    context: &ExceptionContext,
) -> Option<ErrorResponse> {
    ErrorAugmenter::new(DefaultExceptionHandler::new()).handle(exception, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use restbase_core::domain::{
        field_error, message_error, AccessDenied, BusinessRuleViolation, DomainFailure,
        ErrorDetail, ResourceConflict, ResourceNotFound, ValidationDomainError,
    };
    use restbase_core::{DomainError, DomainErrorKind};
    use serde_json::json;

    fn ctx() -> ExceptionContext {
        ExceptionContext::new(Method::POST, "/api/orders/")
    }

    // ── Base converter ──────────────────────────────────────────────

    #[test]
    fn test_base_renders_api_detail() {
        let exc = Exception::from(ApiException::not_found());
        let resp = exception_handler(&exc, &ctx()).unwrap();
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(Value::Object(resp.body), json!({"detail": "Not found."}));
    }

    #[test]
    fn test_base_renders_validation_fields() {
        let exc = Exception::from(ApiException::field("email", "Enter a valid email."));
        let resp = exception_handler(&exc, &ctx()).unwrap();
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            Value::Object(resp.body),
            json!({"email": ["Enter a valid email."]})
        );
    }

    #[test]
    fn test_base_throttled_sets_retry_after() {
        let exc = Exception::from(ApiException::Throttled { wait: Some(30) });
        let resp = exception_handler(&exc, &ctx()).unwrap();
        assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers.get(RETRY_AFTER).unwrap(), "30");

        let exc = Exception::from(ApiException::Throttled { wait: None });
        let resp = exception_handler(&exc, &ctx()).unwrap();
        assert!(resp.headers.get(RETRY_AFTER).is_none());
    }

    #[test]
    fn test_base_auth_scheme_header() {
        let exc = Exception::from(ApiException::NotAuthenticated);

        let resp = exception_handler(&exc, &ctx()).unwrap();
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        assert!(resp.headers.get(WWW_AUTHENTICATE).is_none());

        let base = DefaultExceptionHandler::new().with_auth_scheme("Bearer");
        let resp = base.handle(&exc, &ctx()).unwrap();
        assert_eq!(resp.headers.get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[test]
    fn test_base_renders_domain_detail_without_errors() {
        let exc = Exception::from(BusinessRuleViolation::new(vec![message_error("closed")]));
        let resp = exception_handler(&exc, &ctx()).unwrap();
        assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            Value::Object(resp.body),
            json!({"detail": "The request violates a business rule."})
        );
    }

    #[test]
    fn test_base_declines_unhandled() {
        let exc = Exception::unhandled("connection reset");
        assert!(exception_handler(&exc, &ctx()).is_none());
    }

    // ── Augmenter ───────────────────────────────────────────────────

    #[test]
    fn test_domain_error_gets_errors() {
        let exc = Exception::from(ValidationDomainError::new(vec![field_error(
            "email", "invalid",
        )]));
        let resp = custom_exception_handler(&exc, &ctx()).unwrap();

        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            Value::Object(resp.body),
            json!({
                "detail": "Invalid input.",
                "errors": [{"field": "email", "message": "invalid"}],
            })
        );
    }

    #[test]
    fn test_api_exception_passes_through_unchanged() {
        let exc = Exception::from(ApiException::not_found());
        let base = exception_handler(&exc, &ctx()).unwrap();
        let augmented = custom_exception_handler(&exc, &ctx()).unwrap();
        assert_eq!(augmented, base);
        assert!(!augmented.body.contains_key(ERRORS_KEY));
    }

    #[test]
    fn test_unhandled_stays_none() {
        let exc = Exception::unhandled(std::io::Error::other("disk full"));
        assert!(custom_exception_handler(&exc, &ctx()).is_none());
    }

    #[test]
    fn test_empty_details_gives_empty_errors() {
        let exc = Exception::from(ResourceNotFound::new(Vec::new()));
        let resp = custom_exception_handler(&exc, &ctx()).unwrap();
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(resp.body[ERRORS_KEY], json!([]));
    }

    #[test]
    fn test_every_family_member_is_augmented() {
        let detail = || vec![message_error("x")];
        let members: Vec<Exception> = vec![
            ValidationDomainError::new(detail()).into(),
            BusinessRuleViolation::new(detail()).into(),
            ResourceNotFound::new(detail()).into(),
            ResourceConflict::new(detail()).into(),
            AccessDenied::new(detail()).into(),
            DomainFailure::new(DomainErrorKind::Conflict)
                .with_detail(message_error("x"))
                .into(),
        ];

        for exc in &members {
            let resp = custom_exception_handler(exc, &ctx()).unwrap();
            assert_eq!(resp.body[ERRORS_KEY], json!([{"message": "x"}]), "{exc:?}");
        }
    }

    #[derive(Debug)]
    struct OutOfStock {
        details: Vec<ErrorDetail>,
    }

    impl std::fmt::Display for OutOfStock {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("Out of stock.")
        }
    }

    impl std::error::Error for OutOfStock {}

    impl DomainError for OutOfStock {
        fn kind(&self) -> DomainErrorKind {
            DomainErrorKind::Conflict
        }

        fn details(&self) -> &[ErrorDetail] {
            &self.details
        }
    }

    #[test]
    fn test_user_defined_domain_error_is_augmented() {
        let exc = Exception::domain(OutOfStock {
            details: vec![field_error("sku", "A-1 has no stock"), message_error("retry later")],
        });
        let resp = custom_exception_handler(&exc, &ctx()).unwrap();

        assert_eq!(resp.status, StatusCode::CONFLICT);
        assert_eq!(resp.body["detail"], "Out of stock.");
        assert_eq!(
            resp.body[ERRORS_KEY],
            json!([
                {"field": "sku", "message": "A-1 has no stock"},
                {"message": "retry later"},
            ])
        );
    }

    fn base_with_errors(exception: &Exception, _: &ExceptionContext) -> Option<ErrorResponse> {
        let mut resp = ErrorResponse::detail(StatusCode::BAD_REQUEST, exception.to_string());
        resp.insert(ERRORS_KEY, json!("from base"));
        resp.headers
            .insert("x-base", http::HeaderValue::from_static("1"));
        Some(resp)
    }

    #[test]
    fn test_existing_errors_overwritten_for_domain() {
        let augmenter = ErrorAugmenter::new(base_with_errors);
        let exc = Exception::from(ValidationDomainError::from_fields([("name", "required")]));
        let resp = augmenter.handle(&exc, &ctx()).unwrap();

        assert_eq!(
            resp.body[ERRORS_KEY],
            json!([{"field": "name", "message": "required"}])
        );
        assert_eq!(resp.headers.get("x-base").unwrap(), "1");
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_existing_errors_untouched_for_non_domain() {
        let augmenter = ErrorAugmenter::new(base_with_errors);
        let exc = Exception::from(ApiException::permission_denied());
        let resp = augmenter.handle(&exc, &ctx()).unwrap();
        assert_eq!(resp.body[ERRORS_KEY], json!("from base"));
    }

    #[test]
    fn test_base_none_for_domain_stays_none() {
        let augmenter =
            ErrorAugmenter::new(|_: &Exception, _: &ExceptionContext| -> Option<ErrorResponse> {
                None
            });
        let exc = Exception::from(AccessDenied::new(vec![message_error("x")]));
        assert!(augmenter.handle(&exc, &ctx()).is_none());
    }

    #[test]
    fn test_base_receives_same_exception_and_context() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let expected = ctx().with_view("orders-list").with_request_id("req-1");

        let check = expected.clone();
        let augmenter = ErrorAugmenter::new(move |exc: &Exception, context: &ExceptionContext| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(context, &check);
            assert!(exc.is_domain());
            Some(ErrorResponse::new(StatusCode::BAD_REQUEST))
        });

        let exc = Exception::from(ValidationDomainError::new(Vec::new()));
        augmenter.handle(&exc, &expected).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_augmenter_as_trait_object() {
        let handler: Arc<dyn ExceptionHandler> = Arc::new(custom_exception_handler);
        let exc = Exception::from(ResourceConflict::new(vec![field_error("slug", "taken")]));
        let resp = handler.handle(&exc, &ctx()).unwrap();
        assert_eq!(resp.status, StatusCode::CONFLICT);
        assert_eq!(resp.body[ERRORS_KEY][0]["field"], "slug");
    }
}
