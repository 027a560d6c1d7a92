//! Application registry and app auto-discovery.
//!
//! This module provides the [`AppConfig`] trait and [`AppRegistry`], which
//! together manage the lifecycle of installed applications, plus
//! [`discover_apps`], which finds apps laid out on disk so they don't have to
//! be listed by hand.
//!
//! An app on disk is a directory directly under the apps directory that
//! contains an [`APP_MANIFEST`] file. Its name is its path relative to the
//! project root with separators replaced by dots:
//!
//! ```text
//! <base_dir>/domain/apps/accounts/app.toml  ->  "domain.apps.accounts"
//! ```

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// File that marks a directory as an app.
pub const APP_MANIFEST: &str = "app.toml";

/// Configuration for an installed application.
///
/// Implement this trait for each application that needs to participate in
/// the process lifecycle. The [`ready`](AppConfig::ready) method is called
/// after all applications have been registered.
///
/// # Examples
///
/// ```
/// use restbase_core::apps::AppConfig;
///
/// struct Accounts;
///
/// impl AppConfig for Accounts {
///     fn name(&self) -> &str { "domain.apps.accounts" }
///     fn verbose_name(&self) -> &str { "Accounts" }
/// }
///
/// assert_eq!(Accounts.label(), "accounts");
/// ```
pub trait AppConfig: Send + Sync {
    /// Returns the full dotted name of the application.
    fn name(&self) -> &str;

    /// Returns a short label derived from the name (the last component).
    fn label(&self) -> &str {
        self.name().rsplit('.').next().unwrap_or_else(|| self.name())
    }

    /// Returns a human-readable name for the application.
    fn verbose_name(&self) -> &str {
        self.name()
    }

    /// Called after all apps have been registered.
    fn ready(&self) {}
}

#[derive(Debug, Default, Deserialize)]
struct AppManifest {
    verbose_name: Option<String>,
}

/// An app found on disk by [`discover_apps`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredApp {
    /// Dotted name, e.g. `domain.apps.accounts`.
    pub name: String,
    /// The app directory.
    pub path: PathBuf,
    /// `verbose_name` from the manifest, if set.
    pub verbose_name: Option<String>,
}

impl AppConfig for DiscoveredApp {
    fn name(&self) -> &str {
        &self.name
    }

    fn verbose_name(&self) -> &str {
        self.verbose_name.as_deref().unwrap_or(&self.name)
    }

    fn ready(&self) {
        tracing::debug!(app = %self.name, "app ready");
    }
}

/// Scans `base_dir/apps_directory` for app directories.
///
/// Every direct subdirectory holding an [`APP_MANIFEST`] is returned, sorted
/// by name. Other entries are ignored. A missing apps directory is an error.
pub fn discover_apps(base_dir: &Path, apps_directory: &Path) -> CoreResult<Vec<DiscoveredApp>> {
    let root = base_dir.join(apps_directory);
    let entries = std::fs::read_dir(&root).map_err(|e| {
        CoreError::ImproperlyConfigured(format!(
            "Cannot read apps directory '{}': {e}",
            root.display()
        ))
    })?;

    let mut apps = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let manifest_path = path.join(APP_MANIFEST);
        if !path.is_dir() || !manifest_path.is_file() {
            continue;
        }

        let manifest: AppManifest = toml::from_str(&std::fs::read_to_string(&manifest_path)?)
            .map_err(|e| {
                CoreError::ImproperlyConfigured(format!(
                    "Invalid app manifest '{}': {e}",
                    manifest_path.display()
                ))
            })?;

        let relative = path.strip_prefix(base_dir).unwrap_or(&path);
        let name = dotted_name(relative);
        tracing::debug!(app = %name, "discovered app");
        apps.push(DiscoveredApp {
            name,
            path,
            verbose_name: manifest.verbose_name,
        });
    }

    apps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(apps)
}

fn dotted_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// The central registry of installed applications.
///
/// Applications are registered via [`register`](AppRegistry::register) and then
/// [`populate`](AppRegistry::populate) is called once to finalize initialization
/// (calling each app's `ready()` method).
pub struct AppRegistry {
    apps: Vec<Box<dyn AppConfig>>,
    app_labels: HashMap<String, usize>,
    ready: bool,
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRegistry {
    /// Creates a new, empty `AppRegistry`.
    pub fn new() -> Self {
        Self {
            apps: Vec::new(),
            app_labels: HashMap::new(),
            ready: false,
        }
    }

    /// Registers an application.
    ///
    /// Fails if an application with the same label is already registered, or
    /// if [`populate`](AppRegistry::populate) has already been called.
    pub fn register(&mut self, app: Box<dyn AppConfig>) -> CoreResult<()> {
        if self.ready {
            return Err(CoreError::ImproperlyConfigured(
                "Cannot register apps after the registry has been populated".to_string(),
            ));
        }

        let label = app.label().to_string();
        if self.app_labels.contains_key(&label) {
            return Err(CoreError::ImproperlyConfigured(format!(
                "Application with label '{label}' is already registered"
            )));
        }

        let index = self.apps.len();
        self.app_labels.insert(label, index);
        self.apps.push(app);
        Ok(())
    }

    /// Returns the configuration for the app with the given label, if registered.
    pub fn get_app_config(&self, label: &str) -> Option<&dyn AppConfig> {
        self.app_labels
            .get(label)
            .map(|&idx| self.apps[idx].as_ref())
    }

    /// Returns a slice of all registered app configurations.
    pub fn get_app_configs(&self) -> &[Box<dyn AppConfig>] {
        &self.apps
    }

    /// Finalizes the registry by calling `ready()` on each app in registration order.
    pub fn populate(&mut self) -> CoreResult<()> {
        if self.ready {
            return Err(CoreError::ImproperlyConfigured(
                "AppRegistry has already been populated".to_string(),
            ));
        }

        for app in &self.apps {
            app.ready();
        }

        self.ready = true;
        Ok(())
    }

    /// Returns `true` if the registry has been populated.
    pub const fn is_ready(&self) -> bool {
        self.ready
    }
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.apps.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("ready", &self.ready)
            .finish()
    }
}
