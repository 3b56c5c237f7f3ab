//! In-memory history view backed by [`Database`]
//!
//! Every mutating operation is committed to the database first; the
//! in-memory maps are only updated after the commit succeeds, so a failed
//! transaction leaves both sides unchanged.
//!
//! Other processes (the CLI next to a running daemon) may write the same
//! file. Before each mutation the store compares the database's
//! `data_version` with the one it last loaded and reloads on a mismatch.
//!
//! Canonical ordering: pinned entries first, then by `created_at` descending
//! within each group.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use super::database::{Database, Mutation};
use super::types::{ClipEntry, EntryKind};
use crate::error::{ClipNoteError, Result};

/// Handle returned by [`HistoryStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new row was written; `trimmed` older entries were dropped to stay in bounds
    Inserted { id: String, trimmed: usize },
    /// Content already present; its timestamp was refreshed
    MovedToTop { id: String },
    /// Pinned entries already fill the bound, so the new entry was trimmed
    /// on arrival. Nothing was written and `id` is not in the store.
    Dropped { id: String },
}

impl AddOutcome {
    pub fn id(&self) -> &str {
        match self {
            AddOutcome::Inserted { id, .. }
            | AddOutcome::MovedToTop { id }
            | AddOutcome::Dropped { id } => id,
        }
    }
}

type Listener = Box<dyn FnMut()>;

pub struct HistoryStore {
    db: Database,
    entries: HashMap<String, ClipEntry>,
    /// content_hash -> id
    by_hash: HashMap<String, String>,
    max_items: usize,
    /// `data_version` of the database when `entries` was last loaded
    seen_version: i64,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

fn canonical_order(a: &ClipEntry, b: &ClipEntry) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.created_at.total_cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

impl HistoryStore {
    /// Load persisted entries and enforce `max_items` on them
    pub fn open(db: Database, max_items: usize) -> Result<Self> {
        if max_items == 0 {
            return Err(ClipNoteError::InvalidMaxItems(max_items));
        }

        let seen_version = db.data_version()?;
        let loaded = db.load_entries()?;
        let mut store = Self {
            db,
            entries: HashMap::with_capacity(loaded.len()),
            by_hash: HashMap::with_capacity(loaded.len()),
            max_items,
            seen_version,
            listeners: Vec::new(),
            next_subscription: 0,
        };
        for entry in loaded {
            store.index(entry);
        }

        let trimmed = store.trim(max_items)?;
        info!(
            count = store.entries.len(),
            trimmed, max_items, "Clipboard history loaded"
        );
        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ClipEntry> {
        self.entries.get(id)
    }

    /// Reload from the database if another connection committed since the
    /// last load. Returns whether a reload happened.
    pub fn refresh(&mut self) -> Result<bool> {
        let version = self.db.data_version()?;
        if version == self.seen_version {
            return Ok(false);
        }

        let loaded = self.db.load_entries()?;
        self.entries.clear();
        self.by_hash.clear();
        for entry in loaded {
            self.index(entry);
        }
        self.seen_version = version;
        debug!(count = self.entries.len(), "Reloaded clipboard history after external change");
        self.notify();
        Ok(true)
    }

    /// Insert `entry`, or move the existing entry with the same fingerprint to the top
    pub fn add(&mut self, entry: ClipEntry) -> Result<AddOutcome> {
        self.refresh()?;
        let existing = if entry.content_hash.is_empty() {
            None
        } else {
            self.by_hash.get(&entry.content_hash).cloned()
        };

        if let Some(id) = existing {
            self.commit(&[Mutation::Touch {
                id: id.clone(),
                created_at: entry.created_at,
            }])?;
            if let Some(current) = self.entries.get_mut(&id) {
                current.created_at = entry.created_at;
            }
            debug!(id = %id, "Moved existing clipboard entry to top");
            self.notify();
            return Ok(AddOutcome::MovedToTop { id });
        }

        let victims = self.overflow(self.max_items, Some(&entry));
        if victims.contains(&entry.id) {
            let older: Vec<String> = victims.into_iter().filter(|v| *v != entry.id).collect();
            self.delete_batch(older, "Trimmed clipboard history")?;
            debug!(id = %entry.id, max_items = self.max_items, "Pinned entries fill the bound, dropping new entry");
            return Ok(AddOutcome::Dropped { id: entry.id });
        }

        let mut mutations = Vec::with_capacity(victims.len() + 1);
        mutations.push(Mutation::Insert(entry.clone()));
        mutations.extend(victims.iter().cloned().map(Mutation::Delete));
        self.commit(&mutations)?;

        let id = entry.id.clone();
        debug!(id = %id, kind = entry.kind().as_str(), trimmed = victims.len(), "Added clipboard entry");
        self.index(entry);
        self.unindex_all(&victims);
        self.notify();

        Ok(AddOutcome::Inserted {
            id,
            trimmed: victims.len(),
        })
    }

    /// All entries in canonical order
    pub fn get_all(&self) -> Vec<ClipEntry> {
        let mut all: Vec<ClipEntry> = self.entries.values().cloned().collect();
        all.sort_by(canonical_order);
        all
    }

    /// Case-insensitive substring search; an empty query returns everything
    pub fn search(&self, query: &str) -> Vec<ClipEntry> {
        if query.is_empty() {
            return self.get_all();
        }
        let needle = query.to_lowercase();
        let mut hits: Vec<ClipEntry> = self
            .entries
            .values()
            .filter(|entry| entry.matches(&needle))
            .cloned()
            .collect();
        hits.sort_by(canonical_order);
        hits
    }

    /// Flip the pinned flag and return the new state
    pub fn toggle_pin(&mut self, id: &str) -> Result<bool> {
        self.refresh()?;
        let pinned = match self.entries.get(id) {
            Some(entry) => !entry.pinned,
            None => return Err(ClipNoteError::EntryNotFound(id.to_string())),
        };

        self.commit(&[Mutation::SetPinned {
            id: id.to_string(),
            pinned,
        }])?;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.pinned = pinned;
        }
        info!(id = %id, pinned, "Toggled clipboard entry pin");
        self.notify();
        Ok(pinned)
    }

    /// Delete one entry. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        self.refresh()?;
        if !self.entries.contains_key(id) {
            return Ok(false);
        }
        self.commit(&[Mutation::Delete(id.to_string())])?;
        self.unindex(id);
        info!(id = %id, "Removed clipboard entry");
        self.notify();
        Ok(true)
    }

    /// Delete every entry, optionally sparing pinned ones. Returns the number deleted.
    pub fn clear(&mut self, keep_pinned: bool) -> Result<usize> {
        self.refresh()?;
        let victims: Vec<String> = self
            .entries
            .values()
            .filter(|entry| !(keep_pinned && entry.pinned))
            .map(|entry| entry.id.clone())
            .collect();
        self.delete_batch(victims, "Cleared clipboard history")
    }

    /// Drop the oldest unpinned entries so that the total fits in `max_items`.
    ///
    /// Pinned entries are never deleted, even when they alone exceed the bound.
    pub fn trim(&mut self, max_items: usize) -> Result<usize> {
        self.refresh()?;
        let victims = self.overflow(max_items, None);
        self.delete_batch(victims, "Trimmed clipboard history")
    }

    /// Delete unpinned entries captured before `older_than` (seconds since epoch)
    pub fn expire(&mut self, older_than: f64) -> Result<usize> {
        self.refresh()?;
        let victims: Vec<String> = self
            .entries
            .values()
            .filter(|entry| !entry.pinned && entry.created_at < older_than)
            .map(|entry| entry.id.clone())
            .collect();
        self.delete_batch(victims, "Expired clipboard entries")
    }

    /// Change the bound and trim to it immediately
    pub fn set_max_items(&mut self, max_items: usize) -> Result<usize> {
        if max_items == 0 {
            return Err(ClipNoteError::InvalidMaxItems(max_items));
        }
        let trimmed = self.trim(max_items)?;
        self.max_items = max_items;
        debug!(max_items, trimmed, "Updated history bound");
        Ok(trimmed)
    }

    /// File stems of every image referenced by the history
    pub fn live_image_hashes(&self) -> HashSet<String> {
        self.entries
            .values()
            .filter(|entry| entry.kind() == EntryKind::Image)
            .filter_map(|entry| entry.image_path())
            .filter_map(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect()
    }

    /// Register a change listener.
    ///
    /// Listeners run synchronously after each durable change that alters the
    /// visible set. They cannot borrow the store; re-query after they return.
    pub fn subscribe(&mut self, listener: impl FnMut() + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        for (_, listener) in self.listeners.iter_mut() {
            listener();
        }
    }

    /// Ids of unpinned entries that fall outside `max_items`, optionally
    /// counting a not-yet-stored `incoming` entry.
    fn overflow(&self, max_items: usize, incoming: Option<&ClipEntry>) -> Vec<String> {
        let mut unpinned: Vec<&ClipEntry> = self
            .entries
            .values()
            .chain(incoming)
            .filter(|entry| !entry.pinned)
            .collect();
        let pinned = self.entries.values().chain(incoming).count() - unpinned.len();

        let budget = max_items.saturating_sub(pinned);
        if unpinned.len() <= budget {
            return Vec::new();
        }

        unpinned.sort_by(|a, b| canonical_order(a, b));
        unpinned
            .into_iter()
            .skip(budget)
            .map(|entry| entry.id.clone())
            .collect()
    }

    fn delete_batch(&mut self, victims: Vec<String>, message: &'static str) -> Result<usize> {
        if victims.is_empty() {
            return Ok(0);
        }
        let mutations: Vec<Mutation> = victims.iter().cloned().map(Mutation::Delete).collect();
        self.commit(&mutations)?;
        self.unindex_all(&victims);
        info!(deleted = victims.len(), "{}", message);
        self.notify();
        Ok(victims.len())
    }

    fn commit(&self, mutations: &[Mutation]) -> Result<()> {
        self.db.commit(mutations).map_err(|e| {
            let detail = format!("{:#}", e);
            error!(error = %detail, "Clipboard history transaction rolled back");
            ClipNoteError::Persistence(e)
        })
    }

    fn index(&mut self, entry: ClipEntry) {
        if !entry.content_hash.is_empty() {
            self.by_hash
                .insert(entry.content_hash.clone(), entry.id.clone());
        }
        self.entries.insert(entry.id.clone(), entry);
    }

    fn unindex(&mut self, id: &str) {
        if let Some(entry) = self.entries.remove(id) {
            if self.by_hash.get(&entry.content_hash).map(String::as_str) == Some(id) {
                self.by_hash.remove(&entry.content_hash);
            }
        }
    }

    fn unindex_all(&mut self, ids: &[String]) {
        for id in ids {
            self.unindex(id);
        }
    }
}
