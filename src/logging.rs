//! Logging setup for embedding applications.
//!
//! The library only emits `tracing` events; boss processes that don't
//! install their own subscriber can call [`init`] for a stderr setup,
//! optionally mirrored to a daily-rotated log file. Long-lived bosses
//! usually want the file: proxy lifecycles and rejected handshakes are
//! logged there even when stderr is lost to a supervisor.
//!
//! Configuration comes from code via [`LogConfig`] or from the
//! environment via [`LogConfig::from_env`]:
//!
//! - `DEVOLVE_LOG` (falling back to `RUST_LOG`) - filter directives,
//!   e.g. `devolve=debug` or `warn,devolve::proxy=trace`
//! - `DEVOLVE_LOG_FORMAT` - `text` (default) or `json`
//! - `DEVOLVE_LOG_FILE` - mirror logs to this file

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when no directives are configured.
const DEFAULT_DIRECTIVES: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for terminals and log files.
    #[default]
    Text,
    /// One JSON object per event, for log aggregation.
    Json,
}

impl LogFormat {
    /// Look up a format by its `DEVOLVE_LOG_FORMAT` name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration for [`init`].
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Filter directives. Empty means `info`.
    pub directives: String,
    /// Output format for stderr and the log file.
    pub format: LogFormat,
    /// Mirror logs to this file, rotated daily. `None` = stderr only.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Start from the defaults: `info`, text, stderr only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from the `DEVOLVE_LOG*` environment variables.
    ///
    /// An unrecognized `DEVOLVE_LOG_FORMAT` falls back to text; a bad
    /// filter string is reported once [`init`] tries to use it.
    pub fn from_env() -> Self {
        let directives = std::env::var("DEVOLVE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_default();
        let format = std::env::var("DEVOLVE_LOG_FORMAT")
            .ok()
            .and_then(|name| LogFormat::from_name(&name))
            .unwrap_or_default();
        let file = std::env::var("DEVOLVE_LOG_FILE").ok().map(PathBuf::from);
        Self {
            directives,
            format,
            file,
        }
    }

    /// Set the filter directives.
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = directives.into();
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Mirror logs to a file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        if self.directives.is_empty() {
            return EnvFilter::new(DEFAULT_DIRECTIVES);
        }
        EnvFilter::try_new(&self.directives).unwrap_or_else(|e| {
            eprintln!(
                "devolve: bad log filter {:?} ({}), falling back to {:?}",
                self.directives, e, DEFAULT_DIRECTIVES
            );
            EnvFilter::new(DEFAULT_DIRECTIVES)
        })
    }
}

/// Daily-rotated appender next to the configured file path.
fn appender(path: &Path) -> RollingFileAppender {
    let dir = path.parent().unwrap_or(Path::new("."));
    let name = path.file_name().unwrap_or(OsStr::new("devolve.log"));
    RollingFileAppender::new(Rotation::DAILY, dir, name)
}

/// Install the global tracing subscriber.
///
/// Calling this more than once is harmless: a subscriber that is already
/// installed stays in place.
pub fn init(config: LogConfig) {
    let base = tracing_subscriber::registry().with(config.filter());
    let file = config.file.as_deref().map(appender);

    let _ = match config.format {
        LogFormat::Text => base
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file.map(|a| fmt::layer().with_ansi(false).with_writer(a)))
            .try_init(),
        LogFormat::Json => base
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file.map(|a| fmt::layer().json().with_ansi(false).with_writer(a)))
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::from_name("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::from_name("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::from_name("pretty"), None);
        assert_eq!(LogFormat::from_name(""), None);
    }

    #[test]
    fn test_defaults() {
        let config = LogConfig::new();
        assert!(config.directives.is_empty());
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_builders() {
        let config = LogConfig::new()
            .with_directives("devolve=trace")
            .with_format(LogFormat::Json)
            .with_file("/var/log/devolve.log");
        assert_eq!(config.directives, "devolve=trace");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/var/log/devolve.log")));
    }

    #[test]
    fn test_bad_directives_fall_back() {
        let config = LogConfig::new().with_directives("devolve=notalevel=x");
        // Falls back to the default rather than panicking.
        let filter = config.filter();
        assert_eq!(filter.to_string(), DEFAULT_DIRECTIVES);
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::new().with_file(dir.path().join("test.log"));
        init(config.clone());
        init(config);
    }
}
