//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Default bound on history size
pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 100;

/// Default age-based expiry (0 = disabled)
pub const DEFAULT_AUTO_EXPIRE_DAYS: u32 = 0;

pub const DEFAULT_PRIVATE_MODE: bool = false;

/// Remove an entry from history after it is restored to the clipboard
pub const DEFAULT_CLEAR_ON_PASTE: bool = false;

/// Clipboard polling interval for platforms without change notifications
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";
