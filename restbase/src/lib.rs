//! # restbase
//!
//! Configuration and error-reporting wiring for REST API services on axum.
//!
//! This is the umbrella crate. It re-exports the sub-crates and provides
//! [`app::RestApp`], which assembles settings, middleware, and routes into a
//! runnable server.
//!
//! Handlers raise domain errors; the installed exception handler renders them
//! with their structured details under `errors`:
//!
//! ```
//! use restbase::core::domain::{field_error, ValidationDomainError};
//! use restbase::http::{custom_exception_handler, Exception, ExceptionContext};
//!
//! let exc = Exception::from(ValidationDomainError::new(vec![field_error("email", "invalid")]));
//! let resp = custom_exception_handler(&exc, &ExceptionContext::default()).unwrap();
//! assert_eq!(resp.body["errors"][0]["message"], "invalid");
//! ```

pub mod app;

/// Settings, settings loader, domain errors, app registry, and logging.
pub use restbase_core as core;

/// Exceptions, error responses, exception handlers, and middleware.
pub use restbase_http as http;

pub use app::RestApp;
