use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, warn};

/// Domain errors surfaced by the clipboard history core
#[derive(Error, Debug)]
pub enum ClipNoteError {
    #[error("No history entry with id '{0}'")]
    EntryNotFound(String),

    #[error("max_history_items must be at least 1 (got {0})")]
    InvalidMaxItems(usize),

    #[error("Cached image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Failed to decode cached image: {0}")]
    ImageDecode(String),

    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    #[error("Clipboard access failed: {0}")]
    Clipboard(String),

    /// A backend transaction failed and was rolled back
    #[error("Persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ClipNoteError {
    /// Short message suitable for printing to a terminal user
    pub fn user_message(&self) -> String {
        match self {
            Self::EntryNotFound(id) => format!("No entry {}", id),
            Self::InvalidMaxItems(_) => "History size must be at least 1".to_string(),
            Self::ImageNotFound(_) => "The image for this entry is no longer cached".to_string(),
            Self::Clipboard(msg) => format!("Clipboard unavailable: {}", msg),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClipNoteError>;

/// Extension trait for logging an error and continuing.
///
/// Records the caller's location via `#[track_caller]`.
///
/// ```ignore
/// use clipnote::error::ResultExt;
///
/// let removed = store.remove(&id).log_err();
/// let image = cache.load(&path).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log at error level with caller location and return None.
    fn log_err(self) -> Option<T>;
    /// Log at warn level with caller location and return None.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation warning"
                );
                None
            }
        }
    }
}
