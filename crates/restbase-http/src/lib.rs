//! # restbase-http
//!
//! The HTTP side of restbase: what request handlers raise, how it becomes a
//! JSON error response, and the middleware that wraps the routes.
//!
//! ## Modules
//!
//! - [`exception`] - `Exception` and the framework's `ApiException` taxonomy
//! - [`response`] - The `ErrorResponse` JSON envelope
//! - [`handler`] - The base converter and the error response augmenter
//! - [`layer`] - The axum layer that renders raised exceptions
//! - [`middleware`] - The `Middleware` trait, the pipeline, and built-in middleware

pub mod exception;
pub mod handler;
pub mod layer;
pub mod middleware;
pub mod response;

// Re-export the most commonly used types at the crate root.
pub use exception::{ApiException, Exception};
pub use handler::{
    custom_exception_handler, exception_handler, DefaultExceptionHandler, ErrorAugmenter,
    ExceptionContext, ExceptionHandler,
};
pub use middleware::{Middleware, MiddlewarePipeline};
pub use response::ErrorResponse;
