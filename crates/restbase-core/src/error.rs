//! Core error types for restbase.
//!
//! [`CoreError`] covers everything that can go wrong while the process is
//! being assembled: loading settings, discovering apps, wiring logging.
//! [`ConfigError`] is the narrower error produced by the settings loader when
//! a configuration value is missing or cannot be cast.
//!
//! Errors raised *during request handling* live in `restbase-http`
//! (`Exception`) and in [`crate::domain`].

use thiserror::Error;

/// A configuration value is missing or malformed.
///
/// # Examples
///
/// ```
/// use restbase_core::error::ConfigError;
///
/// let err = ConfigError::Missing("SECRET_KEY".into());
/// assert_eq!(err.to_string(), "SECRET_KEY not found. Declare it as an environment variable or in .env");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key was not present in any configuration source.
    #[error("{0} not found. Declare it as an environment variable or in .env")]
    Missing(String),

    /// A key was present but its value could not be cast to the expected type.
    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    Invalid {
        /// The configuration key.
        key: String,
        /// The raw value that failed to cast.
        value: String,
        /// A short description of the expected type.
        expected: &'static str,
    },

    /// A configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Convenience constructor for [`ConfigError::Invalid`].
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, expected: &'static str) -> Self {
        Self::Invalid {
            key: key.into(),
            value: value.into(),
            expected,
        }
    }
}

/// The primary error type for process assembly.
#[derive(Error, Debug)]
pub enum CoreError {
    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The process is improperly configured (bad app layout, duplicate
    /// registrations, unusable logging setup, ...).
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience type alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;
