//! Notes
//!
//! Free-standing text notes kept next to the clipboard history in the same
//! SQLite file. Notes are independent of history entries: trimming, expiry
//! and clearing never touch them.

mod model;
mod storage;

pub use model::{Note, DEFAULT_NOTE_COLOR};
pub use storage::{
    add_note, delete_note, get_all_notes, get_note, search_notes, set_note_color,
    toggle_note_pinned, update_note,
};
