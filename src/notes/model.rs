//! Note data model

use uuid::Uuid;

/// Colour assigned to new notes
pub const DEFAULT_NOTE_COLOR: &str = "blue";

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    /// Seconds since the Unix epoch
    pub created_at: f64,
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub color: String,
}

impl Note {
    pub fn new(title: impl Into<String>, body: impl Into<String>, created_at: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at,
            title: title.into(),
            body: body.into(),
            pinned: false,
            color: DEFAULT_NOTE_COLOR.to_string(),
        }
    }

    /// Title, or the first non-empty body line when the title is blank
    pub fn display_title(&self) -> &str {
        if !self.title.trim().is_empty() {
            return self.title.trim();
        }
        self.body
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("Untitled")
    }
}
