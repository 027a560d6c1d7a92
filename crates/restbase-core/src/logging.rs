//! Logging integration for restbase services.
//!
//! [`setup_logging`] installs a global [`tracing`] subscriber with one layer
//! per configured [`LogHandler`]. Every line uses the same "verbose" layout:
//!
//! ```text
//! INFO | 2026-03-01 12:00:00,123 | restbase_http::middleware request finished
//! ```
//!
//! `RUST_LOG`, when set, replaces the level directives derived from settings.

use std::fmt;
use std::path::PathBuf;

use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{CoreError, CoreResult};
use crate::settings::{LogHandler, LogLevel, LoggingSettings};

/// Target prefix shared by every restbase crate.
pub const SERVICE_TARGET: &str = "restbase";

/// Keeps the file writer flushing. Drop it only at shutdown.
#[derive(Debug)]
#[must_use = "dropping the guard stops the file writer"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    installed: bool,
    log_file: Option<PathBuf>,
}

impl LoggingGuard {
    /// Whether this call installed the global subscriber. `false` means one
    /// was already installed and this call changed nothing.
    pub const fn installed(&self) -> bool {
        self.installed
    }

    /// The log file written by the file handler, if enabled.
    pub fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }
}

/// The `LEVEL | timestamp | target message` line format.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerboseFormat;

impl<S, N> FormatEvent<S, N> for VerboseFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} | {} | {} ",
            level_name(*meta.level()),
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            meta.target()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

const fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE | Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

/// Maps a configured level onto a `tracing` filter. `Critical` maps to `ERROR`.
pub const fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
    }
}

/// Returns the file name used by the file handler for today.
pub fn log_file_name(app_name: &str) -> String {
    format!("{app_name}-{}.log", Local::now().format("%Y-%m-%d"))
}

/// Builds the global directives: dependencies at `root_level`, restbase
/// targets at the most verbose level of any enabled handler.
pub fn default_directives(settings: &LoggingSettings) -> String {
    let own_level = settings
        .handlers
        .iter()
        .filter_map(|handler| match handler {
            LogHandler::Console => Some(settings.console_level),
            LogHandler::File => Some(settings.file_level),
            LogHandler::Seq => None,
        })
        .min()
        .unwrap_or(settings.console_level);

    format!(
        "{},{SERVICE_TARGET}={}",
        level_filter(settings.root_level),
        level_filter(own_level)
    )
}

/// Sets up the global tracing subscriber from the logging settings.
///
/// Calling it again after a subscriber is installed is a no-op; the returned
/// guard reports [`installed`](LoggingGuard::installed) as `false`.
///
/// # Errors
///
/// Fails when the logs directory can't be created or the level directives
/// don't parse.
pub fn setup_logging(settings: &LoggingSettings) -> CoreResult<LoggingGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(settings)).map_err(|e| {
            CoreError::ImproperlyConfigured(format!("Invalid log directives: {e}"))
        })?,
    };

    let console = settings.handlers.contains(&LogHandler::Console).then(|| {
        tracing_subscriber::fmt::layer()
            .event_format(VerboseFormat)
            .with_writer(std::io::stdout)
            .with_filter(level_filter(settings.console_level))
    });

    let mut file_guard = None;
    let mut log_file = None;
    let file = if settings.handlers.contains(&LogHandler::File) {
        std::fs::create_dir_all(&settings.logs_dir)?;
        let file_name = log_file_name(&settings.app_name);
        log_file = Some(settings.logs_dir.join(&file_name));

        let appender = tracing_appender::rolling::never(&settings.logs_dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .event_format(VerboseFormat)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(level_filter(settings.file_level)),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .is_ok();

    if installed {
        if settings.handlers.contains(&LogHandler::Seq) {
            tracing::warn!(
                url = %settings.seq_server_url,
                "seq log handler is configured but not supported; skipping it"
            );
        }
        tracing::debug!(app = %settings.app_name, handlers = ?settings.handlers, "logging configured");
    }

    Ok(LoggingGuard {
        _file: file_guard,
        installed,
        log_file,
    })
}

/// Creates a tracing span for an HTTP request.
///
/// Every event emitted while the span is entered carries the request id.
///
/// # Examples
///
/// ```
/// use restbase_core::logging::request_span;
///
/// let span = request_span("abc-123");
/// let _guard = span.enter();
/// tracing::info!("handling request");
/// ```
pub fn request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!("request", id = request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_verbose_format_layout() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(VerboseFormat)
                .with_ansi(false)
                .with_writer(captured.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(order = 42, "stock low");
        });

        let line = captured.contents();
        let parts: Vec<&str> = line.trim_end().splitn(3, " | ").collect();
        assert_eq!(parts.len(), 3, "unexpected line: {line}");
        assert_eq!(parts[0], "WARNING");
        // 2026-03-01 12:00:00,123
        assert_eq!(parts[1].len(), 23);
        assert_eq!(&parts[1][19..20], ",");
        assert!(parts[2].starts_with("restbase_core::logging::tests "));
        assert!(parts[2].contains("stock low"));
        assert!(parts[2].contains("order=42"));
    }

    #[test]
    fn test_layer_level_filter_drops_lower_levels() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(VerboseFormat)
                .with_writer(captured.clone())
                .with_filter(level_filter(LogLevel::Error)),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::error!("kept");
        });

        let out = captured.contents();
        assert!(!out.contains("ignored"));
        assert!(out.starts_with("ERROR | "));
    }

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(level_filter(LogLevel::Debug), LevelFilter::DEBUG);
        assert_eq!(level_filter(LogLevel::Warning), LevelFilter::WARN);
        assert_eq!(level_filter(LogLevel::Critical), LevelFilter::ERROR);
    }

    #[test]
    fn test_log_file_name_is_dated() {
        let name = log_file_name("orders-api");
        assert!(name.starts_with("orders-api-"));
        assert!(name.ends_with(".log"));
        // orders-api-YYYY-MM-DD.log
        assert_eq!(name.len(), "orders-api-".len() + 10 + ".log".len());
    }

    #[test]
    fn test_default_directives_use_most_verbose_handler() {
        let settings = LoggingSettings {
            console_level: LogLevel::Warning,
            file_level: LogLevel::Debug,
            handlers: vec![LogHandler::Console, LogHandler::File],
            ..LoggingSettings::default()
        };
        assert_eq!(default_directives(&settings), "warn,restbase=debug");

        let console_only = LoggingSettings {
            console_level: LogLevel::Info,
            file_level: LogLevel::Debug,
            handlers: vec![LogHandler::Console, LogHandler::Seq],
            ..LoggingSettings::default()
        };
        assert_eq!(default_directives(&console_only), "warn,restbase=info");
    }

    #[test]
    fn test_setup_logging_creates_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs_dir = dir.path().join("logs");
        let settings = LoggingSettings {
            app_name: "test-app".to_string(),
            logs_dir: logs_dir.clone(),
            handlers: vec![LogHandler::File, LogHandler::Seq],
            ..LoggingSettings::default()
        };

        let guard = setup_logging(&settings).unwrap();
        assert!(logs_dir.is_dir());
        let log_file = guard.log_file().unwrap();
        assert!(log_file.starts_with(&logs_dir));
        assert!(log_file
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("test-app-"));

        // A second call never replaces the installed subscriber.
        let again = setup_logging(&settings).unwrap();
        assert!(!again.installed());
    }
}
