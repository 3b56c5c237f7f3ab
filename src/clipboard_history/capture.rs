//! Clipboard capture: classify → read → hash → add
//!
//! The OS side is abstracted by [`ClipboardSource`]. A clipboard-changed
//! signal classifies the advertised formats and issues a non-blocking read;
//! the read's result arrives later through [`ClipboardCapture::on_read_complete`].
//! In-flight reads are never cancelled. A newer change simply issues another
//! read, and the last-fingerprint check plus the store's move-to-top absorb
//! whatever duplicates that produces.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use super::image_cache::{ClipImage, ImageCache};
use super::store::{AddOutcome, HistoryStore};
use super::types::{ClipEntry, ClipPayload};
use crate::error::Result;

pub const MIME_URI_LIST: &str = "text/uri-list";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_TEXT_UTF8: &str = "text/plain;charset=utf-8";
pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";

/// Which read path a clipboard change takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentClass {
    Files,
    Image,
    Text,
}

/// Pick a read path from advertised MIME types.
///
/// Precedence is file list, then image, then plain text: file managers
/// advertise decorative text/image alongside the URI list.
pub fn classify<S: AsRef<str>>(formats: &[S]) -> Option<ContentClass> {
    let has = |mime: &str| formats.iter().any(|f| f.as_ref().eq_ignore_ascii_case(mime));

    if has(MIME_URI_LIST) {
        Some(ContentClass::Files)
    } else if has(MIME_PNG) || has(MIME_JPEG) {
        Some(ContentClass::Image)
    } else if has(MIME_TEXT) || has(MIME_TEXT_UTF8) {
        Some(ContentClass::Text)
    } else {
        None
    }
}

/// Extract `file://` URIs from a `text/uri-list` body
pub fn parse_uri_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| line.starts_with("file://"))
        .map(str::to_string)
        .collect()
}

/// Identifies one outstanding clipboard read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadTicket(u64);

impl ReadTicket {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Data delivered by a completed read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPayload {
    Text(String),
    Image(ClipImage),
    /// Raw `text/uri-list` body
    UriList(String),
}

/// Content written back to the clipboard on restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreContent {
    Text(String),
    Image(ClipImage),
    /// Written as a newline-joined `text/uri-list`
    Files(Vec<String>),
}

/// The OS clipboard as seen by capture
pub trait ClipboardSource {
    /// MIME types currently advertised
    fn formats(&mut self) -> Vec<String>;

    /// Start a non-blocking read. The result must be handed to
    /// [`ClipboardCapture::on_read_complete`] with the same ticket on a later
    /// loop iteration.
    fn request_read(&mut self, ticket: ReadTicket, class: ContentClass);

    fn write(&mut self, content: RestoreContent) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Classifying,
    ReadingAsync { pending: usize },
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(AddOutcome),
    /// Same fingerprint as the last captured content
    Duplicate,
    /// Blank text or a URI list with no file URIs
    Empty,
    /// Read error, logged and dropped
    ReadFailed,
    /// The store rejected the entry (transaction rolled back)
    StoreFailed,
    /// Completion for a ticket we never issued
    UnknownTicket,
}

pub struct ClipboardCapture<S: ClipboardSource> {
    source: S,
    cache: ImageCache,
    state: CaptureState,
    last_fingerprint: Option<String>,
    in_flight: HashMap<ReadTicket, ContentClass>,
    next_ticket: u64,
}

impl<S: ClipboardSource> ClipboardCapture<S> {
    pub fn new(source: S, cache: ImageCache) -> Self {
        Self {
            source,
            cache,
            state: CaptureState::Idle,
            last_fingerprint: None,
            in_flight: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn last_fingerprint(&self) -> Option<&str> {
        self.last_fingerprint.as_deref()
    }

    /// Treat `fingerprint` as the last captured content, so its next
    /// clipboard echo is ignored.
    pub fn mark_captured(&mut self, fingerprint: &str) {
        self.last_fingerprint = Some(fingerprint.to_string());
    }

    /// Handle an OS clipboard-changed signal. Returns the ticket of the read
    /// that was issued, if the content is capturable.
    pub fn on_clipboard_changed(&mut self) -> Option<ReadTicket> {
        self.state = CaptureState::Classifying;
        let formats = self.source.formats();

        let Some(class) = classify(&formats) else {
            debug!(formats = ?formats, "No capturable clipboard format");
            self.settle();
            return None;
        };

        let ticket = ReadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight.insert(ticket, class);
        self.state = CaptureState::ReadingAsync {
            pending: self.in_flight.len(),
        };

        debug!(ticket = ticket.0, class = ?class, "Requesting clipboard read");
        self.source.request_read(ticket, class);
        Some(ticket)
    }

    /// Continuation for a read issued by [`on_clipboard_changed`](Self::on_clipboard_changed)
    pub fn on_read_complete(
        &mut self,
        ticket: ReadTicket,
        result: Result<ReadPayload>,
        store: &mut HistoryStore,
        captured_at: f64,
    ) -> CaptureOutcome {
        let Some(class) = self.in_flight.remove(&ticket) else {
            warn!(ticket = ticket.0, "Read completion for unknown ticket");
            return CaptureOutcome::UnknownTicket;
        };

        let outcome = match result {
            Err(e) => {
                warn!(ticket = ticket.0, class = ?class, error = %e, "Clipboard read failed, dropping event");
                CaptureOutcome::ReadFailed
            }
            Ok(payload) => {
                self.state = CaptureState::Hashing;
                self.ingest(payload, store, captured_at)
            }
        };

        self.settle();
        outcome
    }

    fn ingest(
        &mut self,
        payload: ReadPayload,
        store: &mut HistoryStore,
        captured_at: f64,
    ) -> CaptureOutcome {
        let entry = match payload {
            ReadPayload::Text(text) => ClipEntry::text(&text, captured_at),
            ReadPayload::UriList(body) => ClipEntry::files(parse_uri_list(&body), captured_at),
            ReadPayload::Image(image) => {
                let hash = image.fingerprint();
                if self.is_repeat(&hash) {
                    return CaptureOutcome::Duplicate;
                }
                let path = self.cache.store_as(&image, &hash);
                Some(ClipEntry::image(
                    path,
                    hash,
                    image.width,
                    image.height,
                    captured_at,
                ))
            }
        };

        let Some(entry) = entry else {
            return CaptureOutcome::Empty;
        };

        if self.is_repeat(&entry.content_hash) {
            debug!(hash = %entry.content_hash, "Ignoring repeat of last captured content");
            return CaptureOutcome::Duplicate;
        }

        let hash = entry.content_hash.clone();
        let kind = entry.kind();
        match store.add(entry) {
            Ok(outcome) => {
                self.last_fingerprint = Some(hash);
                debug!(id = %outcome.id(), kind = kind.as_str(), "Captured clipboard content");
                CaptureOutcome::Captured(outcome)
            }
            Err(e) => {
                error!(error = %e, kind = kind.as_str(), "Failed to store captured content");
                CaptureOutcome::StoreFailed
            }
        }
    }

    /// Put `entry` back on the system clipboard.
    ///
    /// This does not touch the last-captured fingerprint: restoring an older
    /// entry is captured again and moves it to the top.
    pub fn restore(&mut self, entry: &ClipEntry) -> Result<()> {
        let content = match &entry.payload {
            ClipPayload::Text(text) => RestoreContent::Text(text.clone()),
            ClipPayload::Image(path) => RestoreContent::Image(self.cache.load(path)?),
            ClipPayload::Files(uris) => RestoreContent::Files(uris.clone()),
        };

        self.source.write(content).map_err(|e| {
            warn!(id = %entry.id, error = %e, "Failed to restore clipboard entry");
            e
        })?;
        info!(id = %entry.id, kind = entry.kind().as_str(), "Restored clipboard entry");
        Ok(())
    }

    fn is_repeat(&self, hash: &str) -> bool {
        !hash.is_empty() && self.last_fingerprint.as_deref() == Some(hash)
    }

    fn settle(&mut self) {
        self.state = if self.in_flight.is_empty() {
            CaptureState::Idle
        } else {
            CaptureState::ReadingAsync {
                pending: self.in_flight.len(),
            }
        };
    }
}

/// Join URIs the way `text/uri-list` expects
pub fn uri_list_body(uris: &[String]) -> String {
    uris.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::database::Database;
    use crate::error::ClipNoteError;
    use tempfile::TempDir;

    /// Scripted clipboard: records requested reads and writes
    #[derive(Default)]
    struct FakeSource {
        formats: Vec<String>,
        requested: Vec<(ReadTicket, ContentClass)>,
        written: Vec<RestoreContent>,
        fail_writes: bool,
    }

    impl FakeSource {
        fn advertise(&mut self, formats: &[&str]) {
            self.formats = formats.iter().map(|f| f.to_string()).collect();
        }
    }

    impl ClipboardSource for FakeSource {
        fn formats(&mut self) -> Vec<String> {
            self.formats.clone()
        }

        fn request_read(&mut self, ticket: ReadTicket, class: ContentClass) {
            self.requested.push((ticket, class));
        }

        fn write(&mut self, content: RestoreContent) -> Result<()> {
            if self.fail_writes {
                return Err(ClipNoteError::Clipboard("no display".into()));
            }
            self.written.push(content);
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        capture: ClipboardCapture<FakeSource>,
        store: HistoryStore,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = ImageCache::open(dir.path().join("images")).unwrap();
        let store = HistoryStore::open(Database::open_in_memory().unwrap(), 50).unwrap();
        Harness {
            _dir: dir,
            capture: ClipboardCapture::new(FakeSource::default(), cache),
            store,
        }
    }

    impl Harness {
        fn copy(&mut self, formats: &[&str], payload: ReadPayload, at: f64) -> CaptureOutcome {
            self.capture.source_mut().advertise(formats);
            let ticket = self.capture.on_clipboard_changed().unwrap();
            self.capture
                .on_read_complete(ticket, Ok(payload), &mut self.store, at)
        }
    }

    #[test]
    fn test_classify_precedence() {
        assert_eq!(
            classify(&["text/plain", "image/png", "text/uri-list"]),
            Some(ContentClass::Files)
        );
        assert_eq!(classify(&["text/plain", "image/jpeg"]), Some(ContentClass::Image));
        assert_eq!(classify(&["text/plain;charset=utf-8"]), Some(ContentClass::Text));
        assert_eq!(classify(&["application/x-custom"]), None);
        assert_eq!(classify::<&str>(&[]), None);
    }

    #[test]
    fn test_parse_uri_list_skips_comments_and_non_files() {
        let body = "# copied\r\nfile:///home/u/a.txt\r\n\nhttps://example.com\nfile:///tmp/b%20c.png\n";
        assert_eq!(
            parse_uri_list(body),
            vec!["file:///home/u/a.txt", "file:///tmp/b%20c.png"]
        );
    }

    #[test]
    fn test_state_machine_walks_to_idle() {
        let mut h = harness();
        assert_eq!(h.capture.state(), CaptureState::Idle);

        h.capture.source_mut().advertise(&["text/plain"]);
        let ticket = h.capture.on_clipboard_changed().unwrap();
        assert_eq!(h.capture.state(), CaptureState::ReadingAsync { pending: 1 });
        assert_eq!(h.capture.source().requested, vec![(ticket, ContentClass::Text)]);

        let outcome = h.capture.on_read_complete(
            ticket,
            Ok(ReadPayload::Text("hello".into())),
            &mut h.store,
            1.0,
        );
        assert!(matches!(outcome, CaptureOutcome::Captured(AddOutcome::Inserted { .. })));
        assert_eq!(h.capture.state(), CaptureState::Idle);
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn test_unclassifiable_change_issues_no_read() {
        let mut h = harness();
        h.capture.source_mut().advertise(&["application/octet-stream"]);
        assert!(h.capture.on_clipboard_changed().is_none());
        assert_eq!(h.capture.state(), CaptureState::Idle);
        assert!(h.capture.source().requested.is_empty());
    }

    #[test]
    fn test_immediate_repeat_is_discarded() {
        let mut h = harness();
        let first = h.copy(&["text/plain"], ReadPayload::Text("same".into()), 1.0);
        let second = h.copy(&["text/plain"], ReadPayload::Text("same".into()), 2.0);

        assert!(matches!(first, CaptureOutcome::Captured(_)));
        assert_eq!(second, CaptureOutcome::Duplicate);
        assert_eq!(h.store.get_all()[0].created_at, 1.0);
    }

    #[test]
    fn test_blank_text_is_empty() {
        let mut h = harness();
        let outcome = h.copy(&["text/plain"], ReadPayload::Text("   \n".into()), 1.0);
        assert_eq!(outcome, CaptureOutcome::Empty);
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_read_failure_is_dropped() {
        let mut h = harness();
        h.capture.source_mut().advertise(&["image/png"]);
        let ticket = h.capture.on_clipboard_changed().unwrap();
        let outcome = h.capture.on_read_complete(
            ticket,
            Err(ClipNoteError::Clipboard("decode error".into())),
            &mut h.store,
            1.0,
        );
        assert_eq!(outcome, CaptureOutcome::ReadFailed);
        assert!(h.store.is_empty());
        assert_eq!(h.capture.state(), CaptureState::Idle);
        assert!(h.capture.last_fingerprint().is_none());
    }

    #[test]
    fn test_overlapping_reads_both_complete() {
        let mut h = harness();
        h.capture.source_mut().advertise(&["text/plain"]);
        let first = h.capture.on_clipboard_changed().unwrap();
        let second = h.capture.on_clipboard_changed().unwrap();
        assert_eq!(h.capture.state(), CaptureState::ReadingAsync { pending: 2 });

        // Both reads observe the newest content
        let a = h.capture.on_read_complete(
            first,
            Ok(ReadPayload::Text("newest".into())),
            &mut h.store,
            1.0,
        );
        assert_eq!(h.capture.state(), CaptureState::ReadingAsync { pending: 1 });
        let b = h.capture.on_read_complete(
            second,
            Ok(ReadPayload::Text("newest".into())),
            &mut h.store,
            1.1,
        );

        assert!(matches!(a, CaptureOutcome::Captured(_)));
        assert_eq!(b, CaptureOutcome::Duplicate);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.capture.state(), CaptureState::Idle);

        let stale = h.capture.on_read_complete(
            first,
            Ok(ReadPayload::Text("late".into())),
            &mut h.store,
            2.0,
        );
        assert_eq!(stale, CaptureOutcome::UnknownTicket);
    }

    #[test]
    fn test_files_capture_and_order_independent_dedup() {
        let mut h = harness();
        let a = h.copy(
            &["text/uri-list", "text/plain"],
            ReadPayload::UriList("file:///a/b.txt\nfile:///a/c.txt".into()),
            1.0,
        );
        let b = h.copy(
            &["text/uri-list"],
            ReadPayload::UriList("file:///a/c.txt\nfile:///a/b.txt".into()),
            2.0,
        );
        assert!(matches!(a, CaptureOutcome::Captured(_)));
        assert_eq!(b, CaptureOutcome::Duplicate);

        let entry = &h.store.get_all()[0];
        assert_eq!(entry.preview, "2 files: b.txt, c.txt");

        let none = h.copy(&["text/uri-list"], ReadPayload::UriList("# only comments".into()), 3.0);
        assert_eq!(none, CaptureOutcome::Empty);
    }

    #[test]
    fn test_image_capture_writes_cache_file() {
        let mut h = harness();
        let image = ClipImage::new(2, 1, vec![255, 0, 0, 255, 0, 255, 0, 255]);
        let outcome = h.copy(&["image/png"], ReadPayload::Image(image.clone()), 1.0);
        assert!(matches!(outcome, CaptureOutcome::Captured(_)));

        let entry = &h.store.get_all()[0];
        assert_eq!(entry.preview, "Image (2x1)");
        assert_eq!(entry.content_hash, image.fingerprint());
        assert!(entry.image_path().unwrap().exists());

        let again = h.copy(&["image/png"], ReadPayload::Image(image), 2.0);
        assert_eq!(again, CaptureOutcome::Duplicate);
    }

    #[test]
    fn test_restoring_older_entry_repromotes_it() {
        let mut h = harness();
        h.copy(&["text/plain"], ReadPayload::Text("older".into()), 1.0);
        h.copy(&["text/plain"], ReadPayload::Text("newer".into()), 2.0);

        let older = h.store.search("older")[0].clone();
        h.capture.restore(&older).unwrap();
        assert_eq!(
            h.capture.source().written,
            vec![RestoreContent::Text("older".into())]
        );

        // The clipboard echoes the restored content back
        let echo = h.copy(&["text/plain"], ReadPayload::Text("older".into()), 3.0);
        assert_eq!(echo, CaptureOutcome::Captured(AddOutcome::MovedToTop { id: older.id.clone() }));
        assert_eq!(h.store.get_all()[0].id, older.id);
        assert_eq!(h.store.len(), 2);
    }

    #[test]
    fn test_mark_captured_suppresses_echo() {
        let mut h = harness();
        h.copy(&["text/plain"], ReadPayload::Text("gone".into()), 1.0);
        h.copy(&["text/plain"], ReadPayload::Text("other".into()), 2.0);
        let gone = h.store.search("gone")[0].clone();

        h.capture.restore(&gone).unwrap();
        h.capture.mark_captured(&gone.content_hash);
        h.store.remove(&gone.id).unwrap();

        let echo = h.copy(&["text/plain"], ReadPayload::Text("gone".into()), 3.0);
        assert_eq!(echo, CaptureOutcome::Duplicate);
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn test_restore_files_and_images() {
        let mut h = harness();
        let image = ClipImage::new(1, 1, vec![1, 2, 3, 255]);
        h.copy(&["image/png"], ReadPayload::Image(image.clone()), 1.0);
        h.copy(
            &["text/uri-list"],
            ReadPayload::UriList("file:///x\nfile:///y".into()),
            2.0,
        );

        let all = h.store.get_all();
        h.capture.restore(&all[0]).unwrap();
        h.capture.restore(&all[1]).unwrap();
        assert_eq!(
            h.capture.source().written,
            vec![
                RestoreContent::Files(vec!["file:///x".into(), "file:///y".into()]),
                RestoreContent::Image(image),
            ]
        );
    }

    #[test]
    fn test_restore_missing_image_or_failed_write_errors() {
        let mut h = harness();
        let orphan = ClipEntry::image(h.capture.cache().path_for("deadbeef"), "deadbeef".into(), 1, 1, 1.0);
        assert!(matches!(
            h.capture.restore(&orphan),
            Err(ClipNoteError::ImageNotFound(_))
        ));

        h.capture.source_mut().fail_writes = true;
        let text = ClipEntry::text("x", 1.0).unwrap();
        assert!(matches!(h.capture.restore(&text), Err(ClipNoteError::Clipboard(_))));
    }

    #[test]
    fn test_store_failure_does_not_advance_fingerprint() {
        let mut h = harness();
        h.store
            .database()
            .connection()
            .execute_batch("DROP TABLE clips")
            .unwrap();
        let outcome = h.copy(&["text/plain"], ReadPayload::Text("lost".into()), 1.0);
        assert_eq!(outcome, CaptureOutcome::StoreFailed);
        assert!(h.capture.last_fingerprint().is_none());
    }

    #[test]
    fn test_uri_list_body_joins_with_newlines() {
        let uris = vec!["file:///a".to_string(), "file:///b".to_string()];
        assert_eq!(uri_list_body(&uris), "file:///a\nfile:///b");
    }
}
