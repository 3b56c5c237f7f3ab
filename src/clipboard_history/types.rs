//! History entry model
//!
//! A [`ClipEntry`] is immutable once captured except for `pinned` and
//! `created_at`, which only [`HistoryStore`](super::HistoryStore) mutates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use url::Url;
use uuid::Uuid;

use super::hasher::{hash_file_uris, hash_text};

/// Maximum preview length in characters, before the ellipsis marker
pub const PREVIEW_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Text,
    Image,
    Files,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Image => "image",
            EntryKind::Files => "files",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(EntryKind::Text),
            "image" => Some(EntryKind::Image),
            "files" => Some(EntryKind::Files),
            _ => None,
        }
    }
}

/// Captured content, exactly one variant per entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipPayload {
    Text(String),
    /// Path into the image cache
    Image(PathBuf),
    /// `file://` URIs in capture order
    Files(Vec<String>),
}

impl ClipPayload {
    pub fn kind(&self) -> EntryKind {
        match self {
            ClipPayload::Text(_) => EntryKind::Text,
            ClipPayload::Image(_) => EntryKind::Image,
            ClipPayload::Files(_) => EntryKind::Files,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipEntry {
    pub id: String,
    /// Seconds since the Unix epoch
    pub created_at: f64,
    pub preview: String,
    pub payload: ClipPayload,
    pub content_hash: String,
    pub pinned: bool,
}

impl ClipEntry {
    /// Build a text entry. Returns `None` for empty or whitespace-only text.
    pub fn text(text: &str, created_at: f64) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        Some(Self::new(
            created_at,
            text_preview(text),
            ClipPayload::Text(text.to_string()),
            hash_text(text),
        ))
    }

    /// Build an image entry from a cached image path and its pixel fingerprint
    pub fn image(
        path: PathBuf,
        content_hash: String,
        width: u32,
        height: u32,
        created_at: f64,
    ) -> Self {
        Self::new(
            created_at,
            format!("Image ({}x{})", width, height),
            ClipPayload::Image(path),
            content_hash,
        )
    }

    /// Build a file-list entry. Returns `None` for an empty list.
    pub fn files(uris: Vec<String>, created_at: f64) -> Option<Self> {
        if uris.is_empty() {
            return None;
        }
        let preview = files_preview(&uris);
        let content_hash = hash_file_uris(&uris);
        Some(Self::new(
            created_at,
            preview,
            ClipPayload::Files(uris),
            content_hash,
        ))
    }

    fn new(created_at: f64, preview: String, payload: ClipPayload, content_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at,
            preview,
            payload,
            content_hash,
            pinned: false,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.payload.kind()
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.payload {
            ClipPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn image_path(&self) -> Option<&Path> {
        match &self.payload {
            ClipPayload::Image(path) => Some(path),
            _ => None,
        }
    }

    /// Case-insensitive match. `needle_lower` must already be lowercased.
    ///
    /// Text entries match on their full content, others on the preview.
    pub fn matches(&self, needle_lower: &str) -> bool {
        let haystack = match &self.payload {
            ClipPayload::Text(text) => text,
            _ => &self.preview,
        };
        haystack.to_lowercase().contains(needle_lower)
    }

    pub fn created_at_local(&self) -> Option<DateTime<Local>> {
        let secs = self.created_at.floor();
        let nanos = ((self.created_at - secs) * 1e9) as u32;
        Local.timestamp_opt(secs as i64, nanos).single()
    }

    /// Short label like "5m ago" relative to `now` (seconds since epoch)
    pub fn relative_time(&self, now: f64) -> String {
        relative_time(now - self.created_at)
    }
}

/// Current wall-clock time in seconds since the epoch
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn relative_time(delta_secs: f64) -> String {
    let delta = chrono::Duration::milliseconds((delta_secs.max(0.0) * 1000.0) as i64);
    if delta.num_seconds() < 60 {
        "just now".to_string()
    } else if delta.num_hours() < 1 {
        format!("{}m ago", delta.num_minutes())
    } else if delta.num_days() < 1 {
        format!("{}h ago", delta.num_hours())
    } else {
        format!("{}d ago", delta.num_days())
    }
}

pub(crate) fn text_preview(text: &str) -> String {
    let head: String = text
        .chars()
        .take(PREVIEW_MAX_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let mut preview = head.trim().to_string();
    if text.chars().count() > PREVIEW_MAX_CHARS {
        preview.push_str("...");
    }
    preview
}

fn display_name(uri: &str) -> String {
    Url::parse(uri)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| uri.to_string())
}

pub(crate) fn files_preview(uris: &[String]) -> String {
    let names: Vec<String> = uris.iter().map(|u| display_name(u)).collect();

    let preview = match names.len() {
        0 => String::new(),
        1 => names[0].clone(),
        2 | 3 => format!("{} files: {}", names.len(), names.join(", ")),
        n => format!("{} files: {}, ...", n, names[..2].join(", ")),
    };

    if preview.chars().count() > PREVIEW_MAX_CHARS {
        let mut cut: String = preview.chars().take(PREVIEW_MAX_CHARS - 3).collect();
        cut.push_str("...");
        cut
    } else {
        preview
    }
}
