//! Logging configuration types.

use super::defaults::{
    default_enable_file_logging, default_log_dir, default_log_filename, default_log_format,
    default_rotation,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where and how the relay writes its logs.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling log files
    pub dir: String,
    /// Log file base name
    pub filename: String,
    /// "daily" (default), "hourly" or "never"
    pub rotation: String,
    /// Explicit filter level. Unset means `RUST_LOG`, then `info`.
    #[serde(deserialize_with = "lenient_level")]
    pub level: Option<LogLevel>,
    /// Also write to a rolling file next to stdout
    pub enable_file_logging: bool,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            filename: default_log_filename(),
            rotation: default_rotation(),
            level: None,
            enable_file_logging: default_enable_file_logging(),
            format: default_log_format(),
        }
    }
}

/// Accept a level name or the list form `HELIX__LOGGING__LEVEL=warn,foo`
/// produces. Anything unparseable becomes `None` rather than failing the
/// whole document.
fn lenient_level<'de, D>(deserializer: D) -> Result<Option<LogLevel>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let raw = match &value {
        Some(serde_json::Value::String(s)) => s.as_str(),
        Some(serde_json::Value::Array(items)) => {
            match items.first().and_then(serde_json::Value::as_str) {
                Some(first) => first,
                None => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    let level = LogLevel::parse(raw);
    if level.is_none() {
        eprintln!("Ignoring unknown log level '{raw}'");
    }
    Ok(level)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Also accepts `warning` and `err`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `json` for machine ingestion, `text` for terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}
