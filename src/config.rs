use camino::Utf8PathBuf;
use tracing::Level;

use crate::error::ConfigError;
use crate::graph::UnknownDependencies;
use crate::metadata::DEFAULT_FILE_NAMES;

pub const DEFAULT_GIT_REF: &str = "main";
pub const DEFAULT_OUTPUT: &str = "iaciq.json";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Everything a single planning run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory where the repository lookup starts.
    pub root: Utf8PathBuf,
    /// Reference the worktree is compared against.
    pub git_ref: String,
    /// Declaration file names, in priority order.
    pub file_names: Vec<String>,
    /// Where the report is written.
    pub output: Utf8PathBuf,
    pub log_level: Level,
    pub unknown_dependencies: UnknownDependencies,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("."),
            git_ref: DEFAULT_GIT_REF.to_string(),
            file_names: DEFAULT_FILE_NAMES.iter().map(|s| s.to_string()).collect(),
            output: Utf8PathBuf::from(DEFAULT_OUTPUT),
            log_level: Level::INFO,
            unknown_dependencies: UnknownDependencies::Allow,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_names.iter().all(|name| name.trim().is_empty()) {
            return Err(ConfigError::NoFileNames);
        }
        Ok(())
    }
}

/// Parses a log level name the way Python's `logging` spells them, so
/// `WARNING` and `CRITICAL` are accepted next to the `tracing` names.
pub fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(ConfigError::LogLevel(level.to_string())),
    }
}
