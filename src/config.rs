//! Configuration parsing.
//!
//! ```toml
//! sources = ["wit/deps/geo", "wit"]
//! extension = "json"
//! world = "ns:app/main"
//!
//! [logging]
//! level = "wit_canon=debug"
//! format = "json"
//! output = "stderr"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::loader::DEFAULT_EXTENSION;

/// Configuration loaded from a TOML file.
///
/// Every field is optional; command line flags override what is set here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Source directories, one package per directory.
    pub sources: Vec<PathBuf>,
    /// Extension of document files inside the source directories.
    pub extension: String,
    /// Default world, as `ns:pkg/world@version`.
    pub world: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            extension: DEFAULT_EXTENSION.to_string(),
            world: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Output format of log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `wit_canon=trace`.
    pub level: String,
    pub format: LogFormat,
    /// `stdout`, `stderr` or a file path to append to.
    pub output: String,
    /// Use ANSI colors when writing to a terminal.
    pub color: bool,
    /// Include the event target.
    pub target: bool,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
            output: "stderr".to_string(),
            color: true,
            target: false,
            timestamps: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
sources = ["wit/deps/geo", "wit"]
world = "ns:app/main@1.0.0"

[logging]
level = "wit_canon=debug"
format = "json"
timestamps = false
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources.first().unwrap(), Path::new("wit/deps/geo"));
        assert_eq!(config.extension, "json");
        assert_eq!(config.world.as_deref(), Some("ns:app/main@1.0.0"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "wit_canon=debug");
        assert!(!config.logging.timestamps);
        assert_eq!(config.logging.output, "stderr");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(Config::from_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_str("sauces = []").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wit-canon.toml");
        std::fs::write(&path, "extension = \"witdoc\"\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().extension, "witdoc");

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::Io(..))
        ));
    }
}
