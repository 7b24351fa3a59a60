//! Logging context
//!
//! Every run logs to stderr and appends to a log file. Both use the line
//! template from `LOG_FORMAT` (default `{time}; {level}; {message}`) with
//! timestamps rendered through `LOG_DATEFORMAT`.

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use handle_core::{HandleError, Result};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_LOG_DATEFORMAT: &str = "LOG_DATEFORMAT";

pub const DEFAULT_LOG_FORMAT: &str = "{time}; {level}; {message}";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Line template and timestamp format
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub format: String,
    pub date_format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl LogSettings {
    /// Build settings, falling back to the default for an empty template or
    /// an unparsable date format
    pub fn new(format: Option<String>, date_format: Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            format: format
                .filter(|f| !f.trim().is_empty())
                .unwrap_or(defaults.format),
            date_format: date_format
                .filter(|f| is_valid_date_format(f))
                .unwrap_or(defaults.date_format),
        }
    }

    /// Read `LOG_FORMAT` and `LOG_DATEFORMAT`
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(ENV_LOG_FORMAT).ok(),
            std::env::var(ENV_LOG_DATEFORMAT).ok(),
        )
    }
}

fn is_valid_date_format(format: &str) -> bool {
    !format.is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Event formatter rendering one templated line per event
#[derive(Debug, Clone)]
pub struct LineFormat {
    settings: LogSettings,
}

impl LineFormat {
    pub fn new(settings: LogSettings) -> Self {
        Self { settings }
    }

    /// Substitute `{time}`, `{level}` and `{message}` into the template
    pub fn render(&self, time: &str, level: &Level, message: &str) -> String {
        self.settings
            .format
            .replace("{time}", time)
            .replace("{level}", level.as_str())
            .replace("{message}", message)
    }

    fn timestamp(&self) -> String {
        Local::now().format(&self.settings.date_format).to_string()
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
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
        let mut message = String::new();
        ctx.format_fields(Writer::new(&mut message), event)?;

        let line = self.render(&self.timestamp(), event.metadata().level(), &message);
        writeln!(writer, "{}", line)
    }
}

/// Filter directive limiting output to this workspace's crates
fn workspace_directive(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("warn,handlectl={level},handle_core={level}")
}

/// Installed logging for one run
///
/// Created once at startup; call [`LogContext::finish`] before exiting so
/// the log file reaches the disk.
#[derive(Debug)]
pub struct LogContext {
    path: PathBuf,
    file: Arc<File>,
}

impl LogContext {
    /// Open (append) the log file and install the console and file layers
    /// as the global subscriber.
    ///
    /// The console logs DEBUG, or INFO when `quiet`; `RUST_LOG` overrides
    /// the console filter. The file always logs INFO.
    pub fn init(path: &Path, quiet: bool, settings: LogSettings) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                HandleError::Config(format!(
                    "Failed to open log file `{}`: {}",
                    path.display(),
                    e
                ))
            })?;
        let file = Arc::new(file);

        let console_level = if quiet { Level::INFO } else { Level::DEBUG };
        let console_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(workspace_directive(console_level)));
        let file_filter = EnvFilter::new(workspace_directive(Level::INFO));

        let console = tracing_subscriber::fmt::layer()
            .event_format(LineFormat::new(settings.clone()))
            .with_writer(std::io::stderr)
            .with_filter(console_filter);
        let logfile = tracing_subscriber::fmt::layer()
            .event_format(LineFormat::new(settings))
            .with_writer(Arc::clone(&file))
            .with_ansi(false)
            .with_filter(file_filter);

        tracing_subscriber::registry()
            .with(console)
            .with(logfile)
            .try_init()
            .map_err(|e| HandleError::Config(format!("Failed to install logger: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the log file to disk
    pub fn finish(self) {
        if let Err(e) = self.file.sync_all() {
            eprintln!("Failed to sync log file {}: {}", self.path.display(), e);
        }
    }
}
