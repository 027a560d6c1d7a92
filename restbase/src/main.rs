//! The `restbase` server.
//!
//! Loads settings (a TOML/JSON file plus environment overrides, or the
//! environment and `.env` alone), configures logging, registers discovered
//! apps, and serves the health endpoint.

use std::path::PathBuf;

use anyhow::Context;

use restbase::app::{health_routes, load_apps, RestApp};
use restbase::core::logging::setup_logging;
use restbase::core::{settings_loader, SETTINGS};

fn cli() -> clap::Command {
    clap::Command::new("restbase")
        .about("Runs a restbase API service")
        .arg(
            clap::Arg::new("config")
                .long("config")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Settings file (.toml or .json); environment variables override it"),
        )
        .arg(
            clap::Arg::new("base-dir")
                .long("base-dir")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Project root used for .env, apps, and relative paths"),
        )
        .arg(
            clap::Arg::new("addr")
                .long("addr")
                .default_value("0.0.0.0:8000")
                .help("Address to bind to"),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let base_dir = matches.get_one::<PathBuf>("base-dir").cloned();
    let addr = matches
        .get_one::<String>("addr")
        .map_or("0.0.0.0:8000", String::as_str);

    let mut settings = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let loaded = match base_dir {
                Some(base_dir) => settings_loader::from_file_with_env_in(path, base_dir),
                None => settings_loader::from_file_with_env(path),
            };
            loaded.with_context(|| format!("loading settings from {}", path.display()))?
        }
        None => {
            let base_dir = base_dir.unwrap_or_else(|| PathBuf::from("."));
            settings_loader::from_env_in(&base_dir).context("loading settings from environment")?
        }
    };

    let _logging = setup_logging(&settings.logging).context("configuring logging")?;
    let registry = load_apps(&mut settings).context("registering apps")?;
    tracing::info!(
        apps = registry.get_app_configs().len(),
        debug = settings.debug,
        "settings loaded"
    );

    let settings = SETTINGS.configure(settings)?.clone();
    let app = RestApp::new(settings)?.routes(health_routes());
    app.run(addr).await?;
    Ok(())
}
