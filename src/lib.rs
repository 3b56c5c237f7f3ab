//! clipnote - clipboard history with pinning, search, expiry and notes
//!
//! The capture pipeline lives in [`clipboard_history`]; [`daemon`] runs it on
//! a single-threaded event loop.

pub mod clipboard_history;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod notes;
pub mod watcher;
