//! Settings loading from the environment and configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings rooted at the project directory.
//! 2. Optionally load a TOML or JSON file (overriding defaults).
//! 3. Read the `.env` file next to the project (it never overrides real
//!    environment variables).
//! 4. Apply the process environment (highest priority).
//!
//! [`from_env`] / [`from_lookup`] are strict: every required variable must be
//! present. [`apply_env_overrides`] is lenient and only touches the keys it
//! finds; it is what the `*_with_env` file loaders use.
//!
//! ## Environment Variables
//!
//! | Env Var | Setting | Required |
//! |---|---|---|
//! | `SECRET_KEY` | `secret_key` | yes |
//! | `DEBUG` | `debug` | yes |
//! | `ALLOWED_HOSTS` | `allowed_hosts` (comma-separated) | yes |
//! | `DB_ENGINE`, `DB_NAME`, `DB_USER`, `DB_PASS`, `DB_HOST`, `DB_PORT` | `databases.default` | yes |
//! | `CONSOLE_LOG_LEVEL`, `FILE_LOG_LEVEL`, `SEQ_LOG_LEVEL` | `logging.*_level` | yes |
//! | `APP_NAME` | `logging.app_name` | yes |
//! | `LOG_HANDLERS` | `logging.handlers` (comma-separated) | yes |
//! | `EMAIL_BACKEND` | `email.backend` | no |
//! | `EMAIL_HOST`, `EMAIL_PORT`, `EMAIL_HOST_USER`, `EMAIL_HOST_PASSWORD`, `EMAIL_USE_SSL`, `EMAIL_USE_TLS`, `EMAIL_DEFAULT_FROM_EMAIL` | `email.*` | when `DEBUG` is off |
//!
//! ## Examples
//!
//! ```
//! use std::collections::HashMap;
//! use restbase_core::settings_loader;
//!
//! let env: HashMap<&str, &str> = [
//!     ("SECRET_KEY", "s3cret"), ("DEBUG", "true"), ("ALLOWED_HOSTS", "api.example.com"),
//!     ("DB_ENGINE", "postgresql"), ("DB_NAME", "app"), ("DB_USER", "app"),
//!     ("DB_PASS", "pw"), ("DB_HOST", "db"), ("DB_PORT", "5432"),
//!     ("CONSOLE_LOG_LEVEL", "INFO"), ("FILE_LOG_LEVEL", "WARNING"),
//!     ("SEQ_LOG_LEVEL", "ERROR"), ("APP_NAME", "api"), ("LOG_HANDLERS", "console"),
//! ].into_iter().collect();
//!
//! let settings = settings_loader::from_lookup(".", |k| env.get(k).map(ToString::to_string)).unwrap();
//! assert!(settings.debug);
//! assert_eq!(settings.default_database().unwrap().port, 5432);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, CoreError, CoreResult};
use crate::settings::{DatabaseSettings, EmailSettings, LogHandler, LogLevel, Settings};

/// Name of the dotenv file read next to the project.
pub const DOTENV_FILE: &str = ".env";

/// Reads configuration values through a key lookup.
struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    const fn new(lookup: F) -> Self {
        Self { lookup }
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn cast<T>(&self, key: &str, expected: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|_| ConfigError::invalid(key, raw.clone(), expected))
            })
            .transpose()
    }

    fn required_cast<T>(&self, key: &str, expected: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
    {
        self.cast(key, expected)?
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.get(key).map(|raw| parse_bool(key, &raw)).transpose()
    }

    fn required_bool(&self, key: &str) -> Result<bool, ConfigError> {
        self.bool(key)?
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn handlers(&self, key: &str) -> Result<Option<Vec<LogHandler>>, ConfigError> {
        self.get(key)
            .map(|raw| {
                parse_csv(&raw)
                    .iter()
                    .map(|name| {
                        name.parse::<LogHandler>().map_err(|_| {
                            ConfigError::invalid(key, raw.clone(), "console, file or seq")
                        })
                    })
                    .collect()
            })
            .transpose()
    }
}

/// Casts a configuration string to a boolean.
///
/// Accepts `y yes t true on 1` and `n no f false off 0`, case-insensitively.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "bool")),
    }
}

/// Splits a comma-separated value, trimming items and dropping empty ones.
pub fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Loads settings strictly from a key lookup.
///
/// Required keys that the lookup doesn't return produce
/// [`ConfigError::Missing`]; values that fail to cast produce
/// [`ConfigError::Invalid`]. Paths are rooted at `base_dir`.
pub fn from_lookup<F>(base_dir: impl Into<PathBuf>, lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvSource::new(lookup);
    let mut settings = Settings::with_base_dir(base_dir);

    settings.secret_key = env.required("SECRET_KEY")?;
    settings.debug = env.required_bool("DEBUG")?;
    settings.allowed_hosts = parse_csv(&env.required("ALLOWED_HOSTS")?);

    settings.databases.insert(
        "default".to_string(),
        DatabaseSettings {
            engine: env.required("DB_ENGINE")?,
            name: env.required("DB_NAME")?,
            user: env.required("DB_USER")?,
            password: env.required("DB_PASS")?,
            host: env.required("DB_HOST")?,
            port: env.required_cast("DB_PORT", "port number")?,
            options: HashMap::new(),
        },
    );

    settings.logging.console_level = env.required_cast("CONSOLE_LOG_LEVEL", "log level")?;
    settings.logging.file_level = env.required_cast("FILE_LOG_LEVEL", "log level")?;
    settings.logging.seq_level = env.required_cast("SEQ_LOG_LEVEL", "log level")?;
    settings.logging.app_name = env.required("APP_NAME")?;
    settings.logging.handlers = env
        .handlers("LOG_HANDLERS")?
        .ok_or_else(|| ConfigError::Missing("LOG_HANDLERS".to_string()))?;

    settings.email = if settings.debug {
        EmailSettings::development()
    } else {
        EmailSettings {
            backend: env
                .get("EMAIL_BACKEND")
                .unwrap_or_else(|| crate::settings::SMTP_EMAIL_BACKEND.to_string()),
            host: env.required("EMAIL_HOST")?,
            port: env.required_cast("EMAIL_PORT", "port number")?,
            host_user: env.required("EMAIL_HOST_USER")?,
            host_password: env.required("EMAIL_HOST_PASSWORD")?,
            use_ssl: env.required_bool("EMAIL_USE_SSL")?,
            use_tls: env.required_bool("EMAIL_USE_TLS")?,
            default_from_email: Some(env.required("EMAIL_DEFAULT_FROM_EMAIL")?),
        }
    };

    settings.apply_debug_profile();
    Ok(settings)
}

/// Applies the keys present in `lookup` on top of existing settings.
///
/// Absent keys leave the current value alone; present keys must still cast.
/// Nothing is changed unless every present key casts.
///
/// The security profile is recomputed only when `DEBUG` changes `debug`, so
/// an explicit security table survives a matching `DEBUG`. `EMAIL_*` keys
/// apply on top of the loaded mail settings, then debug replaces the mail
/// group with the development setup.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvSource::new(lookup);
    let mut next = settings.clone();

    if let Some(val) = env.get("SECRET_KEY") {
        next.secret_key = val;
    }
    if let Some(debug) = env.bool("DEBUG")? {
        if debug != next.debug {
            next.debug = debug;
            next.apply_debug_profile();
        }
    }
    if let Some(val) = env.get("ALLOWED_HOSTS") {
        next.allowed_hosts = parse_csv(&val);
    }

    let db = next.databases.entry("default".to_string()).or_default();
    if let Some(val) = env.get("DB_ENGINE") {
        db.engine = val;
    }
    if let Some(val) = env.get("DB_NAME") {
        db.name = val;
    }
    if let Some(val) = env.get("DB_USER") {
        db.user = val;
    }
    if let Some(val) = env.get("DB_PASS") {
        db.password = val;
    }
    if let Some(val) = env.get("DB_HOST") {
        db.host = val;
    }
    if let Some(port) = env.cast("DB_PORT", "port number")? {
        db.port = port;
    }

    let logging = &mut next.logging;
    if let Some(level) = env.cast::<LogLevel>("CONSOLE_LOG_LEVEL", "log level")? {
        logging.console_level = level;
    }
    if let Some(level) = env.cast::<LogLevel>("FILE_LOG_LEVEL", "log level")? {
        logging.file_level = level;
    }
    if let Some(level) = env.cast::<LogLevel>("SEQ_LOG_LEVEL", "log level")? {
        logging.seq_level = level;
    }
    if let Some(val) = env.get("APP_NAME") {
        logging.app_name = val;
    }
    if let Some(handlers) = env.handlers("LOG_HANDLERS")? {
        logging.handlers = handlers;
    }

    override_email(&env, &mut next.email)?;
    next.apply_email_profile();

    *settings = next;
    Ok(())
}

fn override_email<F>(env: &EnvSource<F>, email: &mut EmailSettings) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = env.get("EMAIL_BACKEND") {
        email.backend = val;
    }
    if let Some(val) = env.get("EMAIL_HOST") {
        email.host = val;
    }
    if let Some(port) = env.cast("EMAIL_PORT", "port number")? {
        email.port = port;
    }
    if let Some(val) = env.get("EMAIL_HOST_USER") {
        email.host_user = val;
    }
    if let Some(val) = env.get("EMAIL_HOST_PASSWORD") {
        email.host_password = val;
    }
    if let Some(val) = env.bool("EMAIL_USE_SSL")? {
        email.use_ssl = val;
    }
    if let Some(val) = env.bool("EMAIL_USE_TLS")? {
        email.use_tls = val;
    }
    if let Some(val) = env.get("EMAIL_DEFAULT_FROM_EMAIL") {
        email.default_from_email = Some(val);
    }
    Ok(())
}

/// Reads a dotenv file into a map. A missing file yields an empty map.
pub fn read_dotenv(path: &Path) -> CoreResult<HashMap<String, String>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }

    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        ConfigError::Parse(format!("Failed to read '{}': {e}", path.display()))
    })?;

    iter.map(|item| {
        item.map_err(|e| {
            CoreError::from(ConfigError::Parse(format!(
                "Failed to parse '{}': {e}",
                path.display()
            )))
        })
    })
    .collect()
}

/// Builds a lookup that consults `env` first and falls back to `file_values`.
pub fn layered_lookup<'a, E>(
    file_values: &'a HashMap<String, String>,
    env: E,
) -> impl Fn(&str) -> Option<String> + 'a
where
    E: Fn(&str) -> Option<String> + 'a,
{
    move |key| env(key).or_else(|| file_values.get(key).cloned())
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Loads settings strictly from the process environment and `./.env`.
pub fn from_env() -> CoreResult<Settings> {
    from_env_in(".")
}

/// Loads settings strictly from the process environment and
/// `<base_dir>/.env`, rooting paths at `base_dir`.
pub fn from_env_in(base_dir: impl AsRef<Path>) -> CoreResult<Settings> {
    let base_dir = base_dir.as_ref();
    let file_values = read_dotenv(&base_dir.join(DOTENV_FILE))?;
    let settings = from_lookup(base_dir, layered_lookup(&file_values, process_env))?;
    Ok(settings)
}

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> CoreResult<Settings> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| ConfigError::Parse(format!("Failed to parse TOML: {e}")))?;
    from_json_value(toml_to_json(toml_value), None)
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> CoreResult<Settings> {
    let content = read_config_file(path.as_ref())?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file, then applies `.env` and environment overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> CoreResult<Settings> {
    let settings = from_toml_file(path)?;
    with_env(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> CoreResult<Settings> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| ConfigError::Parse(format!("Failed to parse JSON: {e}")))?;
    from_json_value(json_value, None)
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> CoreResult<Settings> {
    let content = read_config_file(path.as_ref())?;
    from_json_str(&content)
}

/// Loads settings from a JSON file, then applies `.env` and environment overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> CoreResult<Settings> {
    let settings = from_json_file(path)?;
    with_env(settings)
}

/// Loads a TOML or JSON file (by extension), then applies environment overrides.
pub fn from_file_with_env(path: impl AsRef<Path>) -> CoreResult<Settings> {
    let settings = from_json_value(read_settings_file(path.as_ref())?, None)?;
    with_env(settings)
}

/// Like [`from_file_with_env`], with `base_dir` replacing the file's
/// `base_dir`.
///
/// `.env` is read from `base_dir`, and paths the file leaves unset are
/// rooted there. Paths the file sets are kept.
pub fn from_file_with_env_in(
    path: impl AsRef<Path>,
    base_dir: impl Into<PathBuf>,
) -> CoreResult<Settings> {
    let settings = from_json_value(read_settings_file(path.as_ref())?, Some(base_dir.into()))?;
    with_env(settings)
}

// ============================================================
// Helpers
// ============================================================

fn with_env(settings: Settings) -> CoreResult<Settings> {
    with_env_from(settings, process_env)
}

/// Applies `<base_dir>/.env` under `env`.
fn with_env_from<E>(mut settings: Settings, env: E) -> CoreResult<Settings>
where
    E: Fn(&str) -> Option<String>,
{
    let file_values = read_dotenv(&settings.base_dir.join(DOTENV_FILE))?;
    apply_env_overrides(&mut settings, layered_lookup(&file_values, env))?;
    Ok(settings)
}

/// Parses a `.toml` or `.json` settings file into a JSON document.
fn read_settings_file(path: &Path) -> CoreResult<serde_json::Value> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let content = read_config_file(path)?;
            let value: toml::Value = toml::from_str(&content)
                .map_err(|e| ConfigError::Parse(format!("Failed to parse TOML: {e}")))?;
            Ok(toml_to_json(value))
        }
        Some("json") => {
            let content = read_config_file(path)?;
            serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(format!("Failed to parse JSON: {e}")).into())
        }
        _ => Err(CoreError::ImproperlyConfigured(format!(
            "Unsupported settings file '{}': expected .toml or .json",
            path.display()
        ))),
    }
}

fn read_config_file(path: &Path) -> CoreResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CoreError::from(ConfigError::Parse(format!(
            "Failed to read '{}': {e}",
            path.display()
        )))
    })
}

/// Merges an override document onto the defaults for its base directory.
///
/// `base_dir` wins over the document's own `base_dir`.
fn from_json_value(
    mut overrides: serde_json::Value,
    base_dir: Option<PathBuf>,
) -> CoreResult<Settings> {
    if let (Some(dir), Some(doc)) = (&base_dir, overrides.as_object_mut()) {
        doc.remove("base_dir");
        tracing::debug!(base_dir = %dir.display(), "settings file base_dir overridden");
    }
    let base_dir = base_dir.unwrap_or_else(|| {
        PathBuf::from(
            overrides
                .get("base_dir")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("."),
        )
    });
    let overrides_security = overrides.get("security").is_some();

    let defaults = serde_json::to_value(Settings::with_base_dir(base_dir)).map_err(|e| {
        CoreError::Serialization(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(defaults, overrides);
    let mut settings: Settings = serde_json::from_value(merged)
        .map_err(|e| ConfigError::Parse(format!("Failed to deserialize settings: {e}")))?;
    if !overrides_security {
        settings.apply_debug_profile();
    }
    settings.apply_email_profile();
    Ok(settings)
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
