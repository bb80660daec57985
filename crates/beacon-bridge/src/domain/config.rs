//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! `main.rs` fills it from CLI arguments, environment variables and the
//! optional TOML file; everything else only ever reads it.

use std::net::SocketAddr;
use std::time::Duration;

use beacon_core::{TableId, TableRange};

/// Port the observer WebSocket listens on when nothing else is configured.
pub const DEFAULT_WS_PORT: u16 = 8000;

/// Baud rate of the beacon receiver.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Substrings that identify a beacon receiver in a port description.
pub const DEFAULT_DEVICE_TOKENS: [&str; 3] = ["microbit", "mbed", "cdc"];

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use beacon_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8000);
/// assert_eq!(cfg.baud_rate, 115_200);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Address the observer WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Serial port to use.  `None` means auto-detect by description.
    pub serial_port: Option<String>,

    pub baud_rate: u32,

    /// Tables that exist at startup, all green.
    pub table_range: TableRange,

    /// Pause between connection attempts while no device is available.
    pub retry_interval: Duration,

    /// Serial read timeout.  Bounds how long the worker takes to notice a
    /// shutdown or a port change while the device is silent.
    pub read_timeout: Duration,

    /// Lowercase substrings matched against port descriptions during
    /// auto-detection.
    pub device_tokens: Vec<String>,
}

impl Default for BridgeConfig {
    /// | Field           | Default                  |
    /// |-----------------|--------------------------|
    /// | ws_bind_addr    | `0.0.0.0:8000`           |
    /// | serial_port     | auto-detect              |
    /// | baud_rate       | `115200`                 |
    /// | table_range     | `1-50`                   |
    /// | retry_interval  | 3 seconds                |
    /// | read_timeout    | 1 second                 |
    /// | device_tokens   | `microbit`, `mbed`, `cdc`|
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address.
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_WS_PORT)),
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            table_range: TableRange::default(),
            retry_interval: Duration::from_secs(3),
            read_timeout: Duration::from_secs(1),
            device_tokens: DEFAULT_DEVICE_TOKENS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Parses a `"start-end"` table range such as `"1-50"`.
///
/// Returns `None` when the text is not two integers separated by `-` or when
/// the bounds do not form a valid range.  The caller decides the fallback.
pub fn parse_table_range(text: &str) -> Option<TableRange> {
    let (start, end) = text.trim().split_once('-')?;
    let start: TableId = start.trim().parse().ok()?;
    let end: TableId = end.trim().parse().ok()?;
    TableRange::new(start, end).ok()
}

/// Normalises a serial port name: surrounding whitespace is removed and an
/// empty value means "auto-detect".
pub fn normalize_port(port: Option<&str>) -> Option<String> {
    port.map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ws_port_is_8000() {
        // Arrange / Act
        let cfg = BridgeConfig::default();
        // Assert
        assert_eq!(cfg.ws_bind_addr.port(), 8000);
        assert_eq!(cfg.ws_bind_addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_default_serial_settings() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.serial_port, None);
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.retry_interval, Duration::from_secs(3));
        assert_eq!(cfg.read_timeout, Duration::from_secs(1));
        assert_eq!(cfg.device_tokens, vec!["microbit", "mbed", "cdc"]);
    }

    #[test]
    fn test_default_table_range_is_one_to_fifty() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.table_range, TableRange::new(1, 50).unwrap());
    }

    #[test]
    fn test_parse_table_range_accepts_start_dash_end() {
        assert_eq!(parse_table_range("5-12"), Some(TableRange::new(5, 12).unwrap()));
        assert_eq!(parse_table_range(" 1 - 3 "), Some(TableRange::new(1, 3).unwrap()));
    }

    #[test]
    fn test_parse_table_range_rejects_garbage() {
        assert_eq!(parse_table_range(""), None);
        assert_eq!(parse_table_range("12"), None);
        assert_eq!(parse_table_range("a-b"), None);
        assert_eq!(parse_table_range("1-2-3"), None);
    }

    #[test]
    fn test_parse_table_range_rejects_invalid_bounds() {
        assert_eq!(parse_table_range("0-10"), None);
        assert_eq!(parse_table_range("10-5"), None);
    }

    #[test]
    fn test_normalize_port_trims_and_treats_empty_as_auto() {
        assert_eq!(normalize_port(Some("  /dev/ttyACM0 ")), Some("/dev/ttyACM0".into()));
        assert_eq!(normalize_port(Some("   ")), None);
        assert_eq!(normalize_port(None), None);
    }
}
