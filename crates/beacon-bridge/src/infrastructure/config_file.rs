//! Optional TOML configuration file.
//!
//! Every key is optional; anything missing falls through to the CLI/env
//! value or the built-in default (see `main.rs` for the precedence rules).
//!
//! ```toml
//! log_level = "debug"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//!
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//! retry_seconds = 3
//! read_timeout_ms = 1000
//! device_tokens = ["microbit", "mbed", "cdc"]
//!
//! [tables]
//! range = "1-30"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level file schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub tables: TablesSection,
}

/// `[server]`: where observers connect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// `[serial]`: the beacon receiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialSection {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub baud_rate: Option<u32>,
    #[serde(default)]
    pub retry_seconds: Option<u64>,
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub device_tokens: Option<Vec<String>>,
}

/// `[tables]`: the classroom layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablesSection {
    /// `"start-end"`, e.g. `"1-50"`.
    #[serde(default)]
    pub range: Option<String>,
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_has_no_overrides() {
        let cfg = FileConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn test_full_file_parses_every_section() {
        // Arrange
        let text = r#"
            log_level = "debug"

            [server]
            host = "127.0.0.1"
            port = 9000

            [serial]
            port = "COM4"
            baud_rate = 9600
            retry_seconds = 5
            read_timeout_ms = 250
            device_tokens = ["calliope"]

            [tables]
            range = "1-30"
        "#;

        // Act
        let cfg = FileConfig::from_toml_str(text).unwrap();

        // Assert
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cfg.server.port, Some(9000));
        assert_eq!(cfg.serial.port.as_deref(), Some("COM4"));
        assert_eq!(cfg.serial.baud_rate, Some(9600));
        assert_eq!(cfg.serial.retry_seconds, Some(5));
        assert_eq!(cfg.serial.read_timeout_ms, Some(250));
        assert_eq!(cfg.serial.device_tokens, Some(vec!["calliope".to_string()]));
        assert_eq!(cfg.tables.range.as_deref(), Some("1-30"));
    }

    #[test]
    fn test_partial_section_leaves_other_keys_unset() {
        let cfg = FileConfig::from_toml_str("[serial]\nbaud_rate = 57600\n").unwrap();
        assert_eq!(cfg.serial.baud_rate, Some(57600));
        assert_eq!(cfg.serial.port, None);
        assert_eq!(cfg.server, ServerSection::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = FileConfig::from_toml_str("[serial]\nbaud = 9600\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = FileConfig::load(Path::new("/nonexistent/beacon-bridge.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
