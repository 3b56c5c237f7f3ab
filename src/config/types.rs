//! Configuration type definitions

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::defaults::*;

/// User-facing settings consumed by the daemon.
///
/// Serialized as camelCase JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Maximum number of history entries (pinned entries count toward it but are never trimmed)
    #[serde(default = "default_max_history_items")]
    pub max_history_items: usize,
    /// Expire unpinned entries older than this many days (0 = never)
    #[serde(default = "default_auto_expire_days")]
    pub auto_expire_days: u32,
    /// Suspend capture entirely
    #[serde(default = "default_private_mode")]
    pub private_mode: bool,
    /// Remove an entry from history once it has been restored
    #[serde(default = "default_clear_on_paste")]
    pub clear_on_paste: bool,
    /// Clipboard polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_history_items() -> usize {
    DEFAULT_MAX_HISTORY_ITEMS
}
fn default_auto_expire_days() -> u32 {
    DEFAULT_AUTO_EXPIRE_DAYS
}
fn default_private_mode() -> bool {
    DEFAULT_PRIVATE_MODE
}
fn default_clear_on_paste() -> bool {
    DEFAULT_CLEAR_ON_PASTE
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            auto_expire_days: DEFAULT_AUTO_EXPIRE_DAYS,
            private_mode: DEFAULT_PRIVATE_MODE,
            clear_on_paste: DEFAULT_CLEAR_ON_PASTE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Replace out-of-range values with their defaults
    pub fn validated(mut self) -> Self {
        if self.max_history_items == 0 {
            warn!(
                value = self.max_history_items,
                default = DEFAULT_MAX_HISTORY_ITEMS,
                "maxHistoryItems must be at least 1, using default"
            );
            self.max_history_items = DEFAULT_MAX_HISTORY_ITEMS;
        }
        if self.poll_interval_ms == 0 {
            warn!(
                default = DEFAULT_POLL_INTERVAL_MS,
                "pollIntervalMs must be positive, using default"
            );
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        self
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
