//! Logging facade over `tracing`.
//!
//! Call sites pass a short context tag (`"orchestrator"`, `"release"`, ...)
//! which is recorded as a structured field.

use std::fs::OpenOptions;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::app_dirs;

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(level: &str) -> LogLevel {
        match level.to_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Install the global subscriber: stderr plus the log file when it can be
/// opened. Calling it again is a no-op.
pub fn init() {
    if FILTER_HANDLE.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);

    let file_layer = open_log_file().map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    if installed.is_ok() {
        let _ = FILTER_HANDLE.set(handle);
        log_info(
            &format!("Bootstrapper v{} started", env!("CARGO_PKG_VERSION")),
            Some("app"),
        );
    }
}

fn open_log_file() -> Option<std::fs::File> {
    let path = app_dirs::get_log_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Change the active level at runtime
pub fn set_log_level(level: LogLevel) {
    if let Some(handle) = FILTER_HANDLE.get() {
        if let Err(e) = handle.reload(EnvFilter::new(level.directive())) {
            log_error(&format!("Failed to change log level: {}", e), Some("logger"));
        }
    }
}

pub fn log_info(message: &str, context: Option<&str>) {
    tracing::info!(context = context.unwrap_or("app"), "{}", message);
}

pub fn log_error(message: &str, context: Option<&str>) {
    tracing::error!(context = context.unwrap_or("app"), "{}", message);
}

pub fn log_debug(message: &str, context: Option<&str>, source: Option<&str>) {
    match source {
        Some(source) => tracing::debug!(
            context = context.unwrap_or("app"),
            source = source,
            "{}",
            message
        ),
        None => tracing::debug!(context = context.unwrap_or("app"), "{}", message),
    }
}

/// Debug log with an explicit context: `log_debug!(&msg, "orchestrator")`
#[macro_export]
macro_rules! log_debug {
    ($msg:expr, $ctx:expr) => {
        $crate::logger::log_debug($msg, Some($ctx), None)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Info);
    }

    #[test]
    fn test_logging_without_subscriber_is_harmless() {
        log_info("info", None);
        log_error("error", Some("test"));
        crate::log_debug!("debug", "test");
        set_log_level(LogLevel::Debug);
    }
}
