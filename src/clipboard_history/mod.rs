//! Clipboard History Module
//!
//! Captures clipboard content (text, images, file lists), deduplicates it by
//! content fingerprint and keeps a bounded, pin-aware history in SQLite.
//!
//! ## Module Structure
//! - `hasher`: Content fingerprints
//! - `image_cache`: Content-addressed PNG files on disk
//! - `types`: `ClipEntry` and its payload
//! - `database`: SQLite schema, migrations and batched writes
//! - `store`: In-memory index over the database with change listeners
//! - `capture`: Change -> classify -> read -> hash -> store state machine
//! - `expiration`: Periodic age-based expiry
//! - `os_clipboard`: arboard-backed clipboard source and change poller

mod capture;
mod database;
mod expiration;
mod hasher;
mod image_cache;
mod os_clipboard;
mod store;
mod types;

pub use capture::{
    classify, ClipboardCapture, ClipboardSource, CaptureOutcome, CaptureState, ContentClass,
    ReadPayload, ReadTicket, RestoreContent,
};
pub use database::{default_db_path, Database, Mutation, SCHEMA_VERSION};
pub use expiration::{expiry_cutoff, ExpirationScheduler, EXPIRE_INTERVAL};
pub use hasher::{hash_file_uris, hash_image_pixels, hash_text};
pub use image_cache::{default_image_dir, ClipImage, ImageCache};
pub use os_clipboard::{ArboardSource, ChangePoller};
pub use store::{AddOutcome, HistoryStore, SubscriptionId};
pub use types::{now_secs, ClipEntry, ClipPayload, EntryKind};
