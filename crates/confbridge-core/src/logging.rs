use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const DEFAULT_FILTER: &str = "confbridge_core=debug,confbridge_video=info";

/// Log verbosity understood by the SDK and its media engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Off,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Verbose,
}

/// SDK-side logging, applied at most once and only before the first token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub sdk_level: LogLevel,
    #[serde(default = "default_media_level")]
    pub media_level: LogLevel,
    /// Directory for timestamped SDK log files. `None` keeps file logging off.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_media_level() -> LogLevel {
    LogLevel::Off
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            sdk_level: LogLevel::Info,
            media_level: LogLevel::Off,
            directory: None,
        }
    }
}

impl LogSettings {
    /// Drop an empty directory, which means "no file logging".
    pub fn normalized(mut self) -> Self {
        if self
            .directory
            .as_ref()
            .is_some_and(|d| d.as_os_str().is_empty())
        {
            self.directory = None;
        }
        self
    }
}

/// Initialize tracing for the host process. Safe to call more than once.
///
/// Honors `RUST_LOG`; falls back to debug output for the core crates.
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
        if tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init()
            .is_err()
        {
            tracing::debug!("a global tracing subscriber was already installed");
        }
    });
}
