//! The domain-error family.
//!
//! Application code signals validation and business-rule failures by raising
//! a type that implements [`DomainError`]. Every member of the family carries
//! an ordered list of [`ErrorDetail`] entries, and a [`DomainErrorKind`] that
//! the HTTP layer maps to a status code.
//!
//! The HTTP layer never inspects concrete types: anything implementing the
//! trait is treated as a member of the family, including types defined in
//! downstream crates.
//!
//! # Examples
//!
//! ```
//! use restbase_core::domain::{field_error, DomainError, DomainErrorKind, ValidationDomainError};
//!
//! let err = ValidationDomainError::new(vec![field_error("email", "invalid")]);
//! assert_eq!(err.kind(), DomainErrorKind::Validation);
//! assert_eq!(err.details()[0]["field"], "email");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One structured failure entry (field name, message, or any other keys).
pub type ErrorDetail = serde_json::Map<String, Value>;

/// Builds the common `{"field": ..., "message": ...}` detail entry.
pub fn field_error(field: impl Into<String>, message: impl Into<String>) -> ErrorDetail {
    let mut detail = ErrorDetail::new();
    detail.insert("field".to_string(), Value::String(field.into()));
    detail.insert("message".to_string(), Value::String(message.into()));
    detail
}

/// Builds a `{"message": ...}` detail entry with no field attached.
pub fn message_error(message: impl Into<String>) -> ErrorDetail {
    let mut detail = ErrorDetail::new();
    detail.insert("message".to_string(), Value::String(message.into()));
    detail
}

/// The discriminator of a domain error, used for HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainErrorKind {
    /// Input failed validation.
    Validation,
    /// Input was well-formed but violates a business rule.
    BusinessRule,
    /// A referenced resource does not exist.
    NotFound,
    /// The request conflicts with the current state of a resource.
    Conflict,
    /// The caller is not allowed to perform the operation.
    PermissionDenied,
}

impl DomainErrorKind {
    /// Returns the HTTP status code associated with this kind.
    ///
    /// - `Validation` -> 400
    /// - `PermissionDenied` -> 403
    /// - `NotFound` -> 404
    /// - `Conflict` -> 409
    /// - `BusinessRule` -> 422
    pub const fn status_code(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::BusinessRule => 422,
        }
    }

    /// Returns the message used when none is supplied.
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Validation => "Invalid input.",
            Self::BusinessRule => "The request violates a business rule.",
            Self::NotFound => "Not found.",
            Self::Conflict => "The request conflicts with the current state of the resource.",
            Self::PermissionDenied => "You do not have permission to perform this action.",
        }
    }

    /// Returns a short, stable machine-readable code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "invalid",
            Self::BusinessRule => "business_rule",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

impl fmt::Display for DomainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A member of the domain-error family.
///
/// `Display` provides the human-readable message that ends up in the
/// response's `detail` key; [`details`](DomainError::details) ends up in
/// `errors`.
///
/// # Examples
///
/// ```
/// use restbase_core::domain::{message_error, DomainError, DomainErrorKind, ErrorDetail};
///
/// #[derive(Debug)]
/// struct InsufficientStock(Vec<ErrorDetail>);
///
/// impl std::fmt::Display for InsufficientStock {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("Insufficient stock.")
///     }
/// }
///
/// impl std::error::Error for InsufficientStock {}
///
/// impl DomainError for InsufficientStock {
///     fn kind(&self) -> DomainErrorKind { DomainErrorKind::BusinessRule }
///     fn details(&self) -> &[ErrorDetail] { &self.0 }
/// }
///
/// let err = InsufficientStock(vec![message_error("sku-1 has 0 units")]);
/// assert_eq!(err.kind().status_code(), 422);
/// ```
pub trait DomainError: std::error::Error + Send + Sync + 'static {
    /// The kind of failure.
    fn kind(&self) -> DomainErrorKind;

    /// The ordered failure entries.
    fn details(&self) -> &[ErrorDetail];

    /// The details as a JSON array, in order.
    fn details_value(&self) -> Value {
        Value::Array(
            self.details()
                .iter()
                .cloned()
                .map(Value::Object)
                .collect(),
        )
    }
}

macro_rules! domain_errors {
    ($($(#[$meta:meta])* $name:ident => $kind:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name {
                message: String,
                details: Vec<ErrorDetail>,
            }

            impl $name {
                /// Creates the error with the kind's default message.
                pub fn new(details: Vec<ErrorDetail>) -> Self {
                    Self {
                        message: DomainErrorKind::$kind.default_message().to_string(),
                        details,
                    }
                }

                /// Replaces the message.
                #[must_use]
                pub fn with_message(mut self, message: impl Into<String>) -> Self {
                    self.message = message.into();
                    self
                }

                /// Appends a detail entry.
                #[must_use]
                pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
                    self.details.push(detail);
                    self
                }

                /// Returns the message.
                pub fn message(&self) -> &str {
                    &self.message
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.message)
                }
            }

            impl std::error::Error for $name {}

            impl DomainError for $name {
                fn kind(&self) -> DomainErrorKind {
                    DomainErrorKind::$kind
                }

                fn details(&self) -> &[ErrorDetail] {
                    &self.details
                }
            }
        )+
    };
}

domain_errors! {
    /// One or more inputs failed validation.
    ValidationDomainError => Validation;
    /// A business rule rejected the operation.
    BusinessRuleViolation => BusinessRule;
    /// A referenced domain object does not exist.
    ResourceNotFound => NotFound;
    /// The operation conflicts with existing state.
    ResourceConflict => Conflict;
    /// The caller may not perform the operation.
    AccessDenied => PermissionDenied;
}

impl ValidationDomainError {
    /// Builds a validation error from `(field, message)` pairs.
    pub fn from_fields<I, F, M>(fields: I) -> Self
    where
        I: IntoIterator<Item = (F, M)>,
        F: Into<String>,
        M: Into<String>,
    {
        Self::new(
            fields
                .into_iter()
                .map(|(field, message)| field_error(field, message))
                .collect(),
        )
    }
}

/// A domain error whose kind and message are decided at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainFailure {
    kind: DomainErrorKind,
    message: String,
    details: Vec<ErrorDetail>,
}

impl DomainFailure {
    /// Creates a failure with the kind's default message and no details.
    pub fn new(kind: DomainErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            details: Vec::new(),
        }
    }

    /// Replaces the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Appends a detail entry.
    #[must_use]
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }
}

impl fmt::Display for DomainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DomainFailure {}

impl DomainError for DomainFailure {
    fn kind(&self) -> DomainErrorKind {
        self.kind
    }

    fn details(&self) -> &[ErrorDetail] {
        &self.details
    }
}
