//! SQLite persistence for clipboard history (and the sibling notes table)
//!
//! Every write goes through [`Database::commit`], which applies a batch of
//! [`Mutation`]s inside one transaction. Schema changes are forward-only
//! migrations gated by the `schema_version` table and applied in `open`.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::types::{ClipEntry, ClipPayload, EntryKind};

/// Migrations in order. Index + 1 is the schema version they produce.
const MIGRATIONS: &[&str] = &[
    // 1: clipboard entries
    r#"
    CREATE TABLE IF NOT EXISTS clips (
        id TEXT PRIMARY KEY,
        created_at REAL NOT NULL,
        kind TEXT NOT NULL,
        preview TEXT NOT NULL DEFAULT '',
        text_content TEXT,
        image_ref TEXT,
        file_uris TEXT,
        content_hash TEXT NOT NULL DEFAULT '',
        pinned INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_clips_created_at ON clips(created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_clips_pinned_created_at ON clips(pinned DESC, created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_clips_content_hash ON clips(content_hash);
    "#,
    // 2: notes
    r#"
    CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        created_at REAL NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL DEFAULT '',
        pinned INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_notes_pinned_created_at ON notes(pinned DESC, created_at DESC);
    "#,
    // 3: note colours
    r#"
    ALTER TABLE notes ADD COLUMN color TEXT NOT NULL DEFAULT 'blue';
    "#,
];

/// Latest schema version this build knows about
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Default database location (`<data_dir>/clipnote/clipnote.db`)
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipnote")
        .join("clipnote.db")
}

/// A single row-level change applied as part of a transaction
#[derive(Debug, Clone)]
pub enum Mutation {
    Insert(ClipEntry),
    Touch { id: String, created_at: f64 },
    SetPinned { id: String, pinned: bool },
    Delete(String),
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path` and run pending migrations
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to enable WAL mode")?;

        // Avoid "database is locked" when the CLI and the daemon overlap
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .context("Failed to set busy_timeout")?;

        let db = Self { conn };
        db.migrate()?;
        info!(db_path = %path.display(), version = SCHEMA_VERSION, "Clipboard database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<u32> {
        let version: Option<u32> = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .context("Failed to read schema version")?;
        Ok(version.unwrap_or(0))
    }

    /// Counter that moves whenever another connection commits to this file.
    ///
    /// Commits made through this handle leave it unchanged.
    pub fn data_version(&self) -> Result<i64> {
        self.conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))
            .context("Failed to read data_version")
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")
            .context("Failed to create schema_version table")?;

        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            warn!(
                current,
                known = SCHEMA_VERSION,
                "Database schema is newer than this build"
            );
            return Ok(());
        }

        for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
            let version = index as u32 + 1;
            let tx = self
                .conn
                .unchecked_transaction()
                .context("Failed to begin migration")?;
            tx.execute_batch(sql)
                .with_context(|| format!("Migration {} failed", version))?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![version],
            )
            .context("Failed to record schema version")?;
            tx.commit()
                .with_context(|| format!("Failed to commit migration {}", version))?;
            info!(version, "Applied database migration");
        }
        Ok(())
    }

    /// All persisted entries, pinned first then newest first
    pub fn load_entries(&self) -> Result<Vec<ClipEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT id, created_at, kind, preview, text_content, image_ref, file_uris,
                       content_hash, pinned
                FROM clips
                ORDER BY pinned DESC, created_at DESC
                "#,
            )
            .context("Failed to prepare load_entries query")?;

        let rows = stmt
            .query_map([], RawClip::from_row)
            .context("Failed to query clips")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to collect clips")?;

        let entries: Vec<ClipEntry> = rows.into_iter().filter_map(RawClip::into_entry).collect();
        debug!(count = entries.len(), "Loaded clipboard entries");
        Ok(entries)
    }

    /// Apply `mutations` atomically. On error nothing is written.
    pub fn commit(&self, mutations: &[Mutation]) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        for mutation in mutations {
            apply(&tx, mutation)?;
        }

        tx.commit().context("Failed to commit transaction")?;
        debug!(count = mutations.len(), "Committed clipboard mutations");
        Ok(())
    }
}

fn apply(conn: &Connection, mutation: &Mutation) -> Result<()> {
    match mutation {
        Mutation::Insert(entry) => {
            let (text, image_ref, file_uris) = match &entry.payload {
                ClipPayload::Text(text) => (Some(text.as_str()), None, None),
                ClipPayload::Image(path) => (None, Some(path.to_string_lossy().into_owned()), None),
                ClipPayload::Files(uris) => (None, None, Some(serde_json::to_string(uris)?)),
            };
            conn.prepare_cached(
                r#"
                INSERT INTO clips (id, created_at, kind, preview, text_content, image_ref,
                                   file_uris, content_hash, pinned)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?
            .execute(params![
                entry.id,
                entry.created_at,
                entry.kind().as_str(),
                entry.preview,
                text,
                image_ref,
                file_uris,
                entry.content_hash,
                entry.pinned,
            ])
            .context("Failed to insert clipboard entry")?;
        }
        Mutation::Touch { id, created_at } => {
            let changed = conn
                .prepare_cached("UPDATE clips SET created_at = ?1 WHERE id = ?2")?
                .execute(params![created_at, id])
                .context("Failed to update entry timestamp")?;
            expect_row(changed, id, "touch")?;
        }
        Mutation::SetPinned { id, pinned } => {
            let changed = conn
                .prepare_cached("UPDATE clips SET pinned = ?1 WHERE id = ?2")?
                .execute(params![pinned, id])
                .context("Failed to update pinned state")?;
            expect_row(changed, id, "pin")?;
        }
        Mutation::Delete(id) => {
            let changed = conn
                .prepare_cached("DELETE FROM clips WHERE id = ?1")?
                .execute(params![id])
                .context("Failed to delete clipboard entry")?;
            expect_row(changed, id, "delete")?;
        }
    }
    Ok(())
}

/// A row-level write that hit nothing means the caller's view is stale
fn expect_row(changed: usize, id: &str, op: &str) -> Result<()> {
    if changed == 0 {
        bail!("Cannot {} clipboard entry {}: no such row", op, id);
    }
    Ok(())
}

struct RawClip {
    id: String,
    created_at: f64,
    kind: String,
    preview: String,
    text_content: Option<String>,
    image_ref: Option<String>,
    file_uris: Option<String>,
    content_hash: String,
    pinned: bool,
}

impl RawClip {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            kind: row.get(2)?,
            preview: row.get(3)?,
            text_content: row.get(4)?,
            image_ref: row.get(5)?,
            file_uris: row.get(6)?,
            content_hash: row.get(7)?,
            pinned: row.get(8)?,
        })
    }

    /// Rows whose payload does not match their kind are skipped
    fn into_entry(self) -> Option<ClipEntry> {
        let payload = match EntryKind::parse(&self.kind) {
            Some(EntryKind::Text) => self.text_content.map(ClipPayload::Text),
            Some(EntryKind::Image) => self.image_ref.map(|p| ClipPayload::Image(PathBuf::from(p))),
            Some(EntryKind::Files) => self
                .file_uris
                .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok())
                .map(ClipPayload::Files),
            None => None,
        };

        let Some(payload) = payload else {
            warn!(id = %self.id, kind = %self.kind, "Skipping malformed clipboard row");
            return None;
        };

        Some(ClipEntry {
            id: self.id,
            created_at: self.created_at,
            preview: self.preview,
            payload,
            content_hash: self.content_hash,
            pinned: self.pinned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_migrations_reach_latest_version() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);

        let color_column: i32 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('notes') WHERE name='color'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(color_column, 1);
    }

    #[test]
    fn test_reopen_does_not_rerun_migrations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("clip.db");

        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();

        let rows: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_commit_persists_every_payload_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.db");
        let text = ClipEntry::text("hello", 3.0).unwrap();
        let image = ClipEntry::image(PathBuf::from("/cache/ab.png"), "ab".into(), 1, 1, 2.0);
        let files = ClipEntry::files(vec!["file:///a".into(), "file:///b".into()], 1.0).unwrap();

        {
            let db = Database::open(&path).unwrap();
            db.commit(&[
                Mutation::Insert(text.clone()),
                Mutation::Insert(image.clone()),
                Mutation::Insert(files.clone()),
            ])
            .unwrap();
        }

        let loaded = Database::open(&path).unwrap().load_entries().unwrap();
        assert_eq!(loaded, vec![text, image, files]);
    }

    #[test]
    fn test_failed_commit_rolls_back_whole_batch() {
        let db = Database::open_in_memory().unwrap();
        let first = ClipEntry::text("first", 1.0).unwrap();
        db.commit(&[Mutation::Insert(first.clone())]).unwrap();

        let second = ClipEntry::text("second", 2.0).unwrap();
        // Re-inserting `first` violates the primary key
        let result = db.commit(&[
            Mutation::Insert(second),
            Mutation::Delete(first.id.clone()),
            Mutation::Insert(ClipEntry {
                id: first.id.clone(),
                ..ClipEntry::text("dup", 3.0).unwrap()
            }),
            Mutation::Insert(first.clone()),
        ]);
        assert!(result.is_err());

        assert_eq!(db.load_entries().unwrap(), vec![first]);
    }

    #[test]
    fn test_touch_pin_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let a = ClipEntry::text("a", 1.0).unwrap();
        let b = ClipEntry::text("b", 2.0).unwrap();
        db.commit(&[Mutation::Insert(a.clone()), Mutation::Insert(b.clone())])
            .unwrap();

        db.commit(&[
            Mutation::Touch {
                id: a.id.clone(),
                created_at: 10.0,
            },
            Mutation::SetPinned {
                id: b.id.clone(),
                pinned: true,
            },
        ])
        .unwrap();

        let loaded = db.load_entries().unwrap();
        assert_eq!(loaded[0].id, b.id);
        assert!(loaded[0].pinned);
        assert_eq!(loaded[1].created_at, 10.0);

        db.commit(&[Mutation::Delete(a.id)]).unwrap();
        assert_eq!(db.load_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_writes_to_missing_rows_fail_and_roll_back() {
        let db = Database::open_in_memory().unwrap();
        let kept = ClipEntry::text("kept", 1.0).unwrap();
        db.commit(&[Mutation::Insert(kept.clone())]).unwrap();

        for stale in [
            Mutation::Touch {
                id: "gone".to_string(),
                created_at: 5.0,
            },
            Mutation::SetPinned {
                id: "gone".to_string(),
                pinned: true,
            },
            Mutation::Delete("gone".to_string()),
        ] {
            let fresh = ClipEntry::text("fresh", 2.0).unwrap();
            let err = db
                .commit(&[Mutation::Insert(fresh), stale])
                .unwrap_err();
            assert!(format!("{:#}", err).contains("no such row"));
        }

        assert_eq!(db.load_entries().unwrap(), vec![kept]);
    }

    #[test]
    fn test_data_version_tracks_other_connections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.db");
        let daemon = Database::open(&path).unwrap();
        let cli = Database::open(&path).unwrap();

        let before = daemon.data_version().unwrap();
        daemon
            .commit(&[Mutation::Insert(ClipEntry::text("own", 1.0).unwrap())])
            .unwrap();
        assert_eq!(daemon.data_version().unwrap(), before);

        cli.commit(&[Mutation::Insert(ClipEntry::text("other", 2.0).unwrap())])
            .unwrap();
        assert_ne!(daemon.data_version().unwrap(), before);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        db.connection()
            .execute(
                "INSERT INTO clips (id, created_at, kind, preview) VALUES ('x', 1.0, 'text', 'p')",
                [],
            )
            .unwrap();
        assert!(db.load_entries().unwrap().is_empty());
    }
}
