//! Notes Storage Layer
//!
//! SQLite-backed persistence for notes. Notes share the clipboard database
//! file and its migrations (see `clipboard_history::database`).

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::model::Note;
use crate::clipboard_history::Database;

const NOTE_COLUMNS: &str = "id, created_at, title, body, pinned, color";

/// Create and persist a new note
pub fn add_note(db: &Database, title: &str, body: &str, created_at: f64) -> Result<Note> {
    let note = Note::new(title, body, created_at);
    db.connection()
        .execute(
            r#"
            INSERT INTO notes (id, created_at, title, body, pinned, color)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                note.id,
                note.created_at,
                note.title,
                note.body,
                note.pinned,
                note.color
            ],
        )
        .context("Failed to insert note")?;

    info!(note_id = %note.id, title = %note.title, "Note created");
    Ok(note)
}

/// Get a note by ID
pub fn get_note(db: &Database, id: &str) -> Result<Option<Note>> {
    let sql = format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS);
    db.connection()
        .query_row(&sql, params![id], row_to_note)
        .optional()
        .context("Failed to get note")
}

/// All notes, pinned first then newest first
pub fn get_all_notes(db: &Database) -> Result<Vec<Note>> {
    let sql = format!(
        "SELECT {} FROM notes ORDER BY pinned DESC, created_at DESC",
        NOTE_COLUMNS
    );
    let mut stmt = db
        .connection()
        .prepare(&sql)
        .context("Failed to prepare get_all_notes query")?;

    let notes = stmt
        .query_map([], row_to_note)
        .context("Failed to query notes")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect notes")?;

    debug!(count = notes.len(), "Retrieved all notes");
    Ok(notes)
}

/// Case-insensitive LIKE search over title and body
pub fn search_notes(db: &Database, query: &str) -> Result<Vec<Note>> {
    if query.trim().is_empty() {
        return get_all_notes(db);
    }

    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("%{}%", escaped);
    let sql = format!(
        r#"
        SELECT {} FROM notes
        WHERE title LIKE ?1 ESCAPE '\' OR body LIKE ?1 ESCAPE '\'
        ORDER BY pinned DESC, created_at DESC
        "#,
        NOTE_COLUMNS
    );

    let mut stmt = db
        .connection()
        .prepare(&sql)
        .context("Failed to prepare search_notes query")?;
    let notes = stmt
        .query_map(params![pattern], row_to_note)
        .context("Failed to search notes")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect note search results")?;

    debug!(query = %query, count = notes.len(), "Note search completed");
    Ok(notes)
}

/// Replace title and body. Returns false if the note does not exist.
pub fn update_note(db: &Database, id: &str, title: &str, body: &str) -> Result<bool> {
    let changed = db
        .connection()
        .execute(
            "UPDATE notes SET title = ?1, body = ?2 WHERE id = ?3",
            params![title, body, id],
        )
        .context("Failed to update note")?;
    debug!(note_id = %id, changed, "Note updated");
    Ok(changed > 0)
}

pub fn set_note_color(db: &Database, id: &str, color: &str) -> Result<bool> {
    let changed = db
        .connection()
        .execute(
            "UPDATE notes SET color = ?1 WHERE id = ?2",
            params![color, id],
        )
        .context("Failed to update note color")?;
    Ok(changed > 0)
}

/// Flip the pinned flag. Returns the new state, or None if the note does not exist.
pub fn toggle_note_pinned(db: &Database, id: &str) -> Result<Option<bool>> {
    let tx = db
        .connection()
        .unchecked_transaction()
        .context("Failed to begin transaction")?;

    let current: Option<bool> = tx
        .query_row(
            "SELECT pinned FROM notes WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read note pin state")?;

    let Some(current) = current else {
        return Ok(None);
    };

    tx.execute(
        "UPDATE notes SET pinned = ?1 WHERE id = ?2",
        params![!current, id],
    )
    .context("Failed to toggle note pin")?;
    tx.commit().context("Failed to commit note pin")?;

    info!(note_id = %id, pinned = !current, "Toggled note pin");
    Ok(Some(!current))
}

/// Hard delete. Returns whether a row existed.
pub fn delete_note(db: &Database, id: &str) -> Result<bool> {
    let deleted = db
        .connection()
        .execute("DELETE FROM notes WHERE id = ?1", params![id])
        .context("Failed to delete note")?;
    if deleted > 0 {
        info!(note_id = %id, "Note deleted");
    }
    Ok(deleted > 0)
}

fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        created_at: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        pinned: row.get(4)?,
        color: row.get(5)?,
    })
}
