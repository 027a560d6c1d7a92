//! Settings for a restbase service.
//!
//! This module provides the [`Settings`] struct, which holds all process
//! configuration, and [`LazySettings`], a globally-accessible, set-once
//! container. Values are normally produced by [`crate::settings_loader`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::apps::DiscoveredApp;
use crate::error::{CoreError, CoreResult};

/// Directory (relative to `base_dir`) scanned for auto-registered apps.
pub const DEFAULT_APPS_DIRECTORY: &str = "domain/apps";

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine (e.g. `postgresql`).
    pub engine: String,
    /// The database name.
    pub name: String,
    /// The database user.
    pub user: String,
    /// The database password.
    pub password: String,
    /// The database host.
    pub host: String,
    /// The database port.
    pub port: u16,
    /// Additional engine-specific options.
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite3".to_string(),
            name: "db.sqlite3".to_string(),
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            options: HashMap::new(),
        }
    }
}

/// Cache backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// The cache backend name.
    pub backend: String,
    /// The cache location (connection string).
    pub location: String,
    /// Cache timeout in seconds.
    pub timeout: u64,
    /// Additional backend-specific options.
    pub options: HashMap<String, serde_json::Value>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let mut options = HashMap::new();
        options.insert(
            "client_class".to_string(),
            serde_json::Value::String("default".to_string()),
        );
        Self {
            backend: "redis".to_string(),
            location: "redis://redis:6379/2".to_string(),
            timeout: 300,
            options,
        }
    }
}

/// A log level, spelled the way the environment configures it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug output.
    Debug,
    /// Informational output.
    Info,
    /// Warnings.
    Warning,
    /// Errors.
    Error,
    /// Critical errors. Reported as errors.
    Critical,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" | "FATAL" => Ok(Self::Critical),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

/// A log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogHandler {
    /// Human-readable lines on stdout.
    Console,
    /// A dated log file under `logs_dir`.
    File,
    /// A Seq server.
    Seq,
}

impl FromStr for LogHandler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "file" => Ok(Self::File),
            "seq" => Ok(Self::Seq),
            other => Err(format!("unknown log handler '{other}'")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Used as the log file name prefix.
    pub app_name: String,
    /// Directory for log files.
    pub logs_dir: PathBuf,
    /// Threshold for the console handler and for the service's own targets.
    pub console_level: LogLevel,
    /// Threshold for the file handler.
    pub file_level: LogLevel,
    /// Threshold for the Seq handler.
    pub seq_level: LogLevel,
    /// Seq ingestion endpoint.
    pub seq_server_url: String,
    /// Enabled outputs.
    pub handlers: Vec<LogHandler>,
    /// Threshold for targets outside the service (dependencies).
    pub root_level: LogLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            app_name: "restbase".to_string(),
            logs_dir: PathBuf::from("logs"),
            console_level: LogLevel::Info,
            file_level: LogLevel::Info,
            seq_level: LogLevel::Info,
            seq_server_url: "http://seq:5341".to_string(),
            handlers: vec![LogHandler::Console],
            root_level: LogLevel::Warning,
        }
    }
}

/// HTTPS and response-hardening configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Mark the session cookie `Secure`.
    pub session_cookie_secure: bool,
    /// Mark the CSRF cookie `Secure`.
    pub csrf_cookie_secure: bool,
    /// Redirect plain-HTTP requests to HTTPS.
    pub ssl_redirect: bool,
    /// `max-age` of the HSTS header; 0 disables it.
    pub hsts_seconds: u64,
    /// Add `preload` to the HSTS header.
    pub hsts_preload: bool,
    /// Add `includeSubDomains` to the HSTS header.
    pub hsts_include_subdomains: bool,
    /// Send `X-Content-Type-Options: nosniff`.
    pub content_type_nosniff: bool,
    /// Send `X-XSS-Protection: 1; mode=block`.
    pub browser_xss_filter: bool,
    /// Value of `X-Frame-Options`.
    pub x_frame_options: String,
    /// Value of `Referrer-Policy`, if any.
    pub referrer_policy: Option<String>,
    /// Trust `X-Forwarded-Host` when building absolute URLs.
    pub use_x_forwarded_host: bool,
    /// Header name and value that mark a request as secure behind a proxy.
    pub proxy_ssl_header: Option<(String, String)>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self::for_debug(true)
    }
}

impl SecuritySettings {
    /// Returns the security profile for the given debug flag.
    ///
    /// Debug mode turns every hardening option off. Production mode enables
    /// secure cookies, SSL redirect, a one-year preloaded HSTS policy, and the
    /// usual response-hardening headers.
    pub fn for_debug(debug: bool) -> Self {
        if debug {
            return Self {
                session_cookie_secure: false,
                csrf_cookie_secure: false,
                ssl_redirect: false,
                hsts_seconds: 0,
                hsts_preload: false,
                hsts_include_subdomains: false,
                content_type_nosniff: false,
                browser_xss_filter: false,
                x_frame_options: "DENY".to_string(),
                referrer_policy: None,
                use_x_forwarded_host: false,
                proxy_ssl_header: None,
            };
        }

        Self {
            session_cookie_secure: true,
            csrf_cookie_secure: true,
            ssl_redirect: true,
            hsts_seconds: 31_536_000, // 1 year
            hsts_preload: true,
            hsts_include_subdomains: true,
            content_type_nosniff: true,
            browser_xss_filter: true,
            x_frame_options: "SAMEORIGIN".to_string(),
            referrer_policy: Some("strict-origin".to_string()),
            use_x_forwarded_host: true,
            proxy_ssl_header: Some(("x-forwarded-proto".to_string(), "https".to_string())),
        }
    }
}

/// Cross-origin resource sharing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsSettings {
    /// Accept every origin.
    pub allow_all_origins: bool,
    /// Accepted origins when `allow_all_origins` is off.
    pub allowed_origins: Vec<String>,
    /// Send `Access-Control-Allow-Credentials: true`.
    pub allow_credentials: bool,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allow_all_origins: true,
            allowed_origins: Vec::new(),
            allow_credentials: false,
        }
    }
}

/// Outgoing mail configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    /// The mail backend name.
    pub backend: String,
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    pub port: u16,
    /// SMTP user.
    pub host_user: String,
    /// SMTP password.
    pub host_password: String,
    /// Use STARTTLS.
    pub use_tls: bool,
    /// Use implicit TLS.
    pub use_ssl: bool,
    /// Default `From` address.
    pub default_from_email: Option<String>,
}

/// Default mail backend.
pub const SMTP_EMAIL_BACKEND: &str = "smtp";

impl Default for EmailSettings {
    fn default() -> Self {
        Self::development()
    }
}

impl EmailSettings {
    /// The development mail setup: an unauthenticated local SMTP catcher.
    pub fn development() -> Self {
        Self {
            backend: SMTP_EMAIL_BACKEND.to_string(),
            host: "smtp4dev".to_string(),
            port: 25,
            host_user: String::new(),
            host_password: String::new(),
            use_tls: false,
            use_ssl: false,
            default_from_email: None,
        }
    }
}

/// Metadata for the generated API schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSchemaSettings {
    /// Schema title.
    pub title: String,
    /// Schema description.
    pub description: String,
    /// API version.
    pub version: String,
    /// Whether the schema endpoint lists itself.
    pub serve_include_schema: bool,
}

impl Default for ApiSchemaSettings {
    fn default() -> Self {
        Self {
            title: "restbase".to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            serve_include_schema: false,
        }
    }
}

/// Framework apps that lead `installed_apps`; discovered apps follow.
pub const FRAMEWORK_APPS: [&str; 2] = ["restbase.core", "restbase.http"];

/// Middleware names, in order, that [`Settings::default`] enables.
pub const DEFAULT_MIDDLEWARE: [&str; 5] = [
    "security",
    "cors",
    "allowed_hosts",
    "x_frame_options",
    "unhandled_exceptions",
];

/// The complete set of service settings.
///
/// # Examples
///
/// ```
/// use restbase_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.language_code, "en-us");
/// assert_eq!(settings.apps_directory, "domain/apps");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Project root; relative paths below resolve against it.
    pub base_dir: PathBuf,
    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The secret key used for cryptographic signing.
    pub secret_key: String,
    /// Hostnames that this service can serve.
    pub allowed_hosts: Vec<String>,
    /// Installed app names. Auto-discovered apps are appended.
    pub installed_apps: Vec<String>,
    /// Directory (relative to `base_dir`) holding auto-registered apps.
    pub apps_directory: String,
    /// The root URL configuration name.
    pub root_urlconf: String,
    /// The model used for users.
    pub auth_user_model: String,

    // ── Middleware ────────────────────────────────────────────────────

    /// Ordered middleware names.
    pub middleware: Vec<String>,

    // ── Database ─────────────────────────────────────────────────────

    /// Database configurations, keyed by alias (e.g. "default").
    pub databases: HashMap<String, DatabaseSettings>,

    // ── Static files / media ─────────────────────────────────────────

    /// URL prefix for static files.
    pub static_url: String,
    /// Where collected static files are placed.
    pub static_root: Option<PathBuf>,
    /// Additional directories to search for static files.
    pub staticfiles_dirs: Vec<PathBuf>,
    /// URL prefix for user-uploaded media files.
    pub media_url: String,
    /// Directory for user-uploaded files.
    pub media_root: Option<PathBuf>,
    /// Template directories.
    pub template_dirs: Vec<PathBuf>,

    // ── Internationalization ─────────────────────────────────────────

    /// The language code (e.g. "en-us").
    pub language_code: String,
    /// The default time zone (e.g. "UTC").
    pub time_zone: String,
    /// Whether translation is enabled.
    pub use_i18n: bool,
    /// Whether to use timezone-aware datetimes.
    pub use_tz: bool,

    // ── Logging / security / cors ────────────────────────────────────

    /// Logging configuration.
    pub logging: LoggingSettings,
    /// HTTPS and hardening options; derived from `debug` by the loader.
    pub security: SecuritySettings,
    /// CORS configuration.
    pub cors: CorsSettings,

    // ── Infrastructure ───────────────────────────────────────────────

    /// Cache backend configurations, keyed by alias (e.g. "default").
    pub caches: HashMap<String, CacheSettings>,
    /// Broker URL for the background task queue.
    pub task_broker_url: String,
    /// Outgoing mail configuration.
    pub email: EmailSettings,
    /// API schema metadata.
    pub api: ApiSchemaSettings,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = HashMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());

        let mut caches = HashMap::new();
        caches.insert("default".to_string(), CacheSettings::default());

        let mut settings = Self {
            base_dir: PathBuf::from("."),
            debug: true,
            secret_key: String::new(),
            allowed_hosts: Vec::new(),
            installed_apps: FRAMEWORK_APPS.iter().map(ToString::to_string).collect(),
            apps_directory: DEFAULT_APPS_DIRECTORY.to_string(),
            root_urlconf: "presentation.api.urls".to_string(),
            auth_user_model: "accounts.User".to_string(),

            middleware: DEFAULT_MIDDLEWARE.iter().map(ToString::to_string).collect(),

            databases,

            static_url: "static/".to_string(),
            static_root: None,
            staticfiles_dirs: Vec::new(),
            media_url: "media/".to_string(),
            media_root: None,
            template_dirs: Vec::new(),

            language_code: "en-us".to_string(),
            time_zone: "UTC".to_string(),
            use_i18n: true,
            use_tz: true,

            logging: LoggingSettings::default(),
            security: SecuritySettings::for_debug(true),
            cors: CorsSettings::default(),

            caches,
            task_broker_url: "redis://redis:6379/1".to_string(),
            email: EmailSettings::development(),
            api: ApiSchemaSettings::default(),

            extra: HashMap::new(),
        };
        settings.resolve_paths();
        settings
    }
}

impl Settings {
    /// Creates default settings rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let mut settings = Self {
            base_dir: base_dir.into(),
            ..Self::default()
        };
        settings.resolve_paths();
        settings
    }

    /// Recomputes every directory that hangs off `base_dir`.
    pub fn resolve_paths(&mut self) {
        let base = self.base_dir.clone();
        self.static_root = Some(base.join("presentation/static"));
        self.media_root = Some(base.join("presentation/media"));
        self.staticfiles_dirs = vec![base.join("presentation/staticfiles")];
        self.template_dirs = vec![base.join("presentation/templates")];
        self.logging.logs_dir = base.join("logs");
    }

    /// Recomputes the security profile from `debug`.
    pub fn apply_debug_profile(&mut self) {
        self.security = SecuritySettings::for_debug(self.debug);
    }

    /// Switches to the development mail setup when `debug` is on. Production
    /// mail settings are left as loaded.
    pub fn apply_email_profile(&mut self) {
        if self.debug {
            self.email = EmailSettings::development();
        }
    }

    /// Absolute path of the apps directory.
    pub fn apps_path(&self) -> PathBuf {
        self.base_dir.join(&self.apps_directory)
    }

    /// Returns the `default` database, if configured.
    pub fn default_database(&self) -> Option<&DatabaseSettings> {
        self.databases.get("default")
    }

    /// Appends apps found under [`apps_path`](Self::apps_path) to
    /// `installed_apps`, skipping names already present. Returns the names
    /// that were added.
    pub fn register_discovered_apps(&mut self) -> CoreResult<Vec<String>> {
        let discovered = crate::apps::discover_apps(&self.base_dir, Path::new(&self.apps_directory))?;
        Ok(self.install_apps(&discovered))
    }

    /// Appends `apps` to `installed_apps`, skipping names already present.
    /// Returns the names that were added.
    pub fn install_apps(&mut self, apps: &[DiscoveredApp]) -> Vec<String> {
        let mut added = Vec::new();
        for app in apps {
            if !self.installed_apps.contains(&app.name) {
                self.installed_apps.push(app.name.clone());
                added.push(app.name.clone());
            }
        }
        added
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup, then use
/// [`get`](LazySettings::get) anywhere.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the settings. Fails if they were already configured.
    pub fn configure(&self, settings: Settings) -> CoreResult<&Settings> {
        self.inner.set(settings).map_err(|_| {
            CoreError::ImproperlyConfigured("Settings have already been configured".to_string())
        })?;
        self.get()
    }

    /// Returns the configured settings.
    pub fn get(&self) -> CoreResult<&Settings> {
        self.inner.get().ok_or_else(|| {
            CoreError::ImproperlyConfigured(
                "Settings have not been configured. Call SETTINGS.configure() first.".to_string(),
            )
        })
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
