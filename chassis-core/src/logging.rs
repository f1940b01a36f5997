//! Logging for the Chassis framework.
//!
//! Thin configuration layer over `tracing` / `tracing-subscriber`. Modules
//! in this crate import the event macros from here so the backend stays in
//! one place.
//!
//! ```no_run
//! use chassis_core::logging::{LogConfig, LogFormat, LogLevel, info};
//!
//! LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init()
//!     .ok();
//! info!("application started");
//! ```
//!
//! The `RUST_LOG` environment variable, when set, overrides the configured
//! level with a full env-filter directive.

pub use tracing::{debug, error, info, trace, warn};

use tracing_subscriber::EnvFilter;

use crate::error::Error;

/// Log level for the subscriber's default filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Single-line output
    #[default]
    Compact,
    /// Structured JSON output
    Json,
}

/// Subscriber configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    level: LogLevel,
    format: LogFormat,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Install the global subscriber. Fails if one is already installed.
    pub fn init(self) -> Result<(), Error> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        let installed = match self.format {
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        installed.map_err(|e| Error::Internal(format!("failed to install subscriber: {e}")))
    }
}
