//! # restbase-core
//!
//! Core types for restbase services. This crate has no HTTP dependencies and
//! provides the foundation the other crates build on.
//!
//! ## Modules
//!
//! - [`error`] - Process-assembly error types and result aliases
//! - [`domain`] - The domain-error family raised by application code
//! - [`settings`] - Service settings and global configuration
//! - [`settings_loader`] - Loading settings from the environment, `.env`, TOML, and JSON
//! - [`apps`] - App discovery and the app registry
//! - [`logging`] - Tracing-based logging setup

pub mod apps;
pub mod domain;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use domain::{DomainError, DomainErrorKind, ErrorDetail};
pub use error::{ConfigError, CoreError, CoreResult};
pub use settings::{Settings, SETTINGS};
