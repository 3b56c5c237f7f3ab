//! Configuration module - user settings for capture and history
//!
//! This module provides functionality for:
//! - Loading configuration from `<config_dir>/clipnote/config.json`
//! - Default values for all settings
//! - Type definitions for config structures
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - The `Config` struct and validation
//! - `loader` - File system loading and saving

mod defaults;
mod loader;
mod types;

pub use defaults::{
    DEFAULT_AUTO_EXPIRE_DAYS, DEFAULT_MAX_HISTORY_ITEMS, DEFAULT_POLL_INTERVAL_MS,
};
pub use loader::{config_path, load_config, load_config_from, save_config};
pub use types::Config;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
