//! Configuration and paths

use std::path::PathBuf;

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub inbox_db: PathBuf,
    pub poll_interval_ms: u64,
    pub max_count: usize,
    pub date_format: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sms-ledger");

        Self {
            inbox_db: data_dir.join("mmssms.db"),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_count: DEFAULT_MAX_COUNT,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &std::path::Path) -> Self {
        Self {
            inbox_db: temp_dir.join("mmssms.db"),
            poll_interval_ms: 50,
            max_count: DEFAULT_MAX_COUNT,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

/// Refresh cadence of the inbox monitor
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Messages fetched per refresh
pub const DEFAULT_MAX_COUNT: usize = 500;

pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Sender shown when a message has no address
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Amount shown when no currency marker matched
pub const AMOUNT_UNAVAILABLE: &str = "N/A";

/// Date shown when the sent timestamp is unusable
pub const DATE_UNAVAILABLE: &str = "N/A";

/// Relative age shown when the sent timestamp is unusable
pub const AGE_UNKNOWN: &str = "unknown";
