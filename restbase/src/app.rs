//! Application assembly.
//!
//! [`RestApp`] combines settings, the middleware pipeline, the exception
//! handler, and the service's routes into a single axum router that can be
//! served directly.
//!
//! # Examples
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use restbase::app::RestApp;
//! use restbase::core::Settings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = RestApp::new(Settings::default())?
//!     .routes(Router::new().route("/ping/", get(|| async { "pong" })));
//!
//! app.run("0.0.0.0:8000").await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use restbase_core::apps::{discover_apps, AppConfig, AppRegistry};
use restbase_core::error::{CoreError, CoreResult};
use restbase_core::Settings;
use restbase_http::handler::{custom_exception_handler, ExceptionHandler};
use restbase_http::layer::{handle_api_exceptions, SharedExceptionHandler};
use restbase_http::middleware::{run_pipeline, Middleware, MiddlewarePipeline};

/// The main application type.
///
/// Routes see the API exception layer first, then the middleware pipeline,
/// then request tracing. The default exception handler is
/// [`custom_exception_handler`].
pub struct RestApp {
    settings: Settings,
    routes: Router,
    middleware: MiddlewarePipeline,
    exception_handler: SharedExceptionHandler,
}

impl RestApp {
    /// Creates the application with the middleware named in `settings`.
    pub fn new(settings: Settings) -> CoreResult<Self> {
        let middleware = MiddlewarePipeline::from_settings(&settings)?;
        Ok(Self {
            settings,
            routes: Router::new(),
            middleware,
            exception_handler: Arc::new(custom_exception_handler),
        })
    }

    /// Merges `router` into the application's routes.
    #[must_use]
    pub fn routes(mut self, router: Router) -> Self {
        self.routes = self.routes.merge(router);
        self
    }

    /// Adds a middleware to the end of the pipeline.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Replaces the exception handler.
    #[must_use]
    pub fn exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exception_handler = Arc::new(handler);
        self
    }

    /// Returns a reference to the application settings.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the number of middleware in the pipeline.
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Converts the application into an axum router.
    pub fn into_router(self) -> Router {
        let pipeline = Arc::new(self.middleware);
        self.routes
            .layer(axum::middleware::from_fn_with_state(
                self.exception_handler,
                handle_api_exceptions,
            ))
            .layer(axum::middleware::from_fn_with_state(pipeline, run_pipeline))
            .layer(TraceLayer::new_for_http())
    }

    /// Runs the application as an HTTP server on the given address.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the address or
    /// encounters an I/O error while serving.
    pub async fn run(self, addr: &str) -> CoreResult<()> {
        let debug = self.settings.debug;
        let router = self.into_router();
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            CoreError::ImproperlyConfigured(format!("Failed to bind to {addr}: {e}"))
        })?;

        if debug {
            tracing::info!("Starting development server at http://{addr}/");
        } else {
            tracing::info!(%addr, "listening");
        }

        axum::serve(listener, router).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RestApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApp")
            .field("debug", &self.settings.debug)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

/// The `/health/` route.
pub fn health_routes() -> Router {
    Router::new().route(
        "/health/",
        get(|| async { Json(serde_json::json!({"status": "ok"})) }),
    )
}

/// Discovers apps under the settings' apps directory, appends them to
/// `installed_apps`, and returns the populated registry.
///
/// A missing apps directory is skipped with a warning.
pub fn load_apps(settings: &mut Settings) -> CoreResult<AppRegistry> {
    let mut registry = AppRegistry::new();

    if settings.apps_path().is_dir() {
        let discovered = discover_apps(&settings.base_dir, Path::new(&settings.apps_directory))?;
        let added = settings.install_apps(&discovered);
        if !added.is_empty() {
            tracing::info!(apps = ?added, "registered discovered apps");
        }
        for app in discovered {
            registry.register(Box::new(app))?;
        }
    } else {
        tracing::warn!(
            path = %settings.apps_path().display(),
            "apps directory not found; skipping app discovery"
        );
    }

    registry.populate()?;
    tracing::debug!(
        labels = ?registry.get_app_configs().iter().map(|a| a.label()).collect::<Vec<_>>(),
        "app registry ready"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use restbase_core::apps::APP_MANIFEST;
    use restbase_http::middleware::builtin::SecurityMiddleware;

    #[test]
    fn test_new_builds_pipeline_from_settings() {
        let app = RestApp::new(Settings::default()).unwrap();
        assert_eq!(app.middleware_count(), 5);
        assert!(app.settings().debug);
    }

    #[test]
    fn test_new_rejects_unknown_middleware() {
        let settings = Settings {
            middleware: vec!["sessions".to_string()],
            ..Settings::default()
        };
        assert!(RestApp::new(settings).is_err());
    }

    #[test]
    fn test_builder_adds_middleware() {
        let settings = Settings {
            middleware: Vec::new(),
            ..Settings::default()
        };
        let app = RestApp::new(settings)
            .unwrap()
            .middleware(SecurityMiddleware::default());
        assert_eq!(app.middleware_count(), 1);
        assert!(format!("{app:?}").contains("RestApp"));
    }

    #[test]
    fn test_load_apps_registers_discovered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["orders", "accounts"] {
            let app_dir = dir.path().join("domain/apps").join(name);
            std::fs::create_dir_all(&app_dir).unwrap();
            std::fs::write(app_dir.join(APP_MANIFEST), "").unwrap();
        }

        let mut settings = Settings::with_base_dir(dir.path());
        settings.installed_apps.push("restbase.health".to_string());
        let registry = load_apps(&mut settings).unwrap();

        assert!(registry.is_ready());
        assert!(registry.get_app_config("accounts").is_some());
        assert!(registry.get_app_config("orders").is_some());
        assert_eq!(
            settings.installed_apps,
            vec![
                "restbase.core",
                "restbase.http",
                "restbase.health",
                "domain.apps.accounts",
                "domain.apps.orders"
            ]
        );

        let registered: Vec<&str> = registry
            .get_app_configs()
            .iter()
            .map(|app| app.name())
            .collect();
        assert_eq!(registered, vec!["domain.apps.accounts", "domain.apps.orders"]);
    }

    #[test]
    fn test_load_apps_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_base_dir(dir.path());
        let registry = load_apps(&mut settings).unwrap();
        assert!(registry.is_ready());
        assert!(registry.get_app_configs().is_empty());
    }
}
