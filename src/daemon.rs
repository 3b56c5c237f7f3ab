//! Single-threaded event loop driving capture, restore and expiry
//!
//! All history mutations happen on the thread that calls [`Daemon::run`].
//! Helper threads (the clipboard poller, the file watchers) only post
//! [`LoopEvent`]s into the channel.
//!
//! Other processes ask the daemon to restore an entry by writing its id to
//! the restore request file (see [`request_restore`]). Whoever removes the
//! file first owns the request: the daemon via [`take_restore_request`], or
//! the requester via [`withdraw_restore_request`] when nobody picked it up.

use std::cell::Cell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::clipboard_history::{
    now_secs, CaptureOutcome, ClipboardCapture, ClipboardSource, ExpirationScheduler,
    HistoryStore, ReadPayload, ReadTicket,
};
use crate::config::{load_config_from, Config};
use crate::error::{Result, ResultExt};

/// Everything the loop reacts to
#[derive(Debug)]
pub enum LoopEvent {
    /// The OS clipboard content changed
    ClipboardChanged,
    /// A read issued for `ticket` finished
    ReadCompleted {
        ticket: ReadTicket,
        result: Result<ReadPayload>,
    },
    /// The config file changed on disk
    ConfigChanged,
    /// The restore request file changed; claim it and restore that entry
    RestoreRequested,
    Shutdown,
}

/// Default location of the restore request file
pub fn restore_request_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipnote")
        .join("restore.request")
}

/// Leave a restore request for a running daemon. Written atomically.
pub fn request_restore(path: &Path, id: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create request directory")?;
    }
    let staging = path.with_extension("tmp");
    fs::write(&staging, id).context("Failed to write restore request")?;
    fs::rename(&staging, path).context("Failed to publish restore request")?;
    Ok(())
}

/// Claim a pending request. `None` if there is none or someone else claimed it.
pub fn take_restore_request(path: &Path) -> Option<String> {
    let id = match fs::read_to_string(path) {
        Ok(contents) => contents.trim().to_string(),
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read restore request");
            return None;
        }
    };
    match fs::remove_file(path) {
        Ok(()) => (!id.is_empty()).then_some(id),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to claim restore request");
            None
        }
    }
}

/// Take back an unclaimed request. Returns true if it was still pending.
pub fn withdraw_restore_request(path: &Path) -> anyhow::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context("Failed to withdraw restore request"),
    }
}

pub struct Daemon<S: ClipboardSource> {
    store: HistoryStore,
    capture: ClipboardCapture<S>,
    scheduler: ExpirationScheduler,
    config: Config,
    config_path: PathBuf,
    events: Receiver<LoopEvent>,
    restore_requests: Option<PathBuf>,
    dirty: Rc<Cell<bool>>,
}

impl<S: ClipboardSource> Daemon<S> {
    /// Assemble the loop and apply `config` (which runs the first expiry sweep)
    pub fn new(
        mut store: HistoryStore,
        capture: ClipboardCapture<S>,
        mut scheduler: ExpirationScheduler,
        config: Config,
        config_path: PathBuf,
        events: Receiver<LoopEvent>,
    ) -> Self {
        let dirty = Rc::new(Cell::new(false));
        let flag = dirty.clone();
        store.subscribe(move || flag.set(true));

        scheduler
            .configure(config.auto_expire_days, &mut store, Instant::now(), now_secs())
            .log_err();

        Self {
            store,
            capture,
            scheduler,
            config,
            config_path,
            events,
            restore_requests: None,
            dirty,
        }
    }

    /// Serve restore requests left at `path`
    pub fn with_restore_requests(mut self, path: PathBuf) -> Self {
        self.restore_requests = Some(path);
        self
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn capture(&self) -> &ClipboardCapture<S> {
        &self.capture
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Block on the event channel until shutdown or until every sender is gone
    pub fn run(mut self) {
        info!(
            entries = self.store.len(),
            max_items = self.store.max_items(),
            "Clipboard daemon running"
        );

        loop {
            let timeout = self.scheduler.time_until_due(Instant::now());
            let keep_going = match self.events.recv_timeout(timeout) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => true,
                Err(RecvTimeoutError::Disconnected) => false,
            };

            // Pick up writes from other processes even when nothing else happens
            self.store.refresh().log_err();
            if let Some(result) = self.scheduler.tick(&mut self.store, Instant::now(), now_secs()) {
                result.log_err();
            }
            self.report_changes();

            if !keep_going {
                break;
            }
        }

        info!("Clipboard daemon stopped");
    }

    /// Process one event. Returns false when the loop should stop.
    pub fn handle(&mut self, event: LoopEvent) -> bool {
        match event {
            LoopEvent::ClipboardChanged => {
                if self.config.private_mode {
                    debug!("Private mode on, ignoring clipboard change");
                } else {
                    self.capture.on_clipboard_changed();
                }
            }
            LoopEvent::ReadCompleted { ticket, result } => {
                let outcome =
                    self.capture
                        .on_read_complete(ticket, result, &mut self.store, now_secs());
                if let CaptureOutcome::Captured(added) = &outcome {
                    debug!(id = %added.id(), "Clipboard content captured");
                }
            }
            LoopEvent::ConfigChanged => {
                let config = load_config_from(&self.config_path);
                self.apply_config(config);
            }
            LoopEvent::RestoreRequested => {
                if let Some(id) = self.restore_requests.as_deref().and_then(take_restore_request) {
                    self.restore(&id);
                }
            }
            LoopEvent::Shutdown => return false,
        }
        true
    }

    /// Apply new settings; unchanged values are left alone
    pub fn apply_config(&mut self, config: Config) {
        if config.max_history_items != self.store.max_items() {
            self.store.set_max_items(config.max_history_items).log_err();
        }
        if config.auto_expire_days != self.scheduler.auto_expire_days() {
            self.scheduler
                .configure(
                    config.auto_expire_days,
                    &mut self.store,
                    Instant::now(),
                    now_secs(),
                )
                .log_err();
        }
        if config.private_mode != self.config.private_mode {
            info!(private_mode = config.private_mode, "Private mode changed");
        }
        self.config = config;
    }

    fn restore(&mut self, id: &str) {
        self.store.refresh().log_err();
        let Some(entry) = self.store.get(id).cloned() else {
            debug!(id = %id, "Restore requested for unknown entry");
            return;
        };

        if self.capture.restore(&entry).is_err() {
            return;
        }

        if self.config.clear_on_paste {
            // The clipboard will echo this content back; don't re-add it
            self.capture.mark_captured(&entry.content_hash);
            self.store.remove(&entry.id).log_err();
        }
    }

    fn report_changes(&mut self) {
        if self.dirty.replace(false) {
            let top = self.store.get_all().into_iter().next();
            debug!(
                entries = self.store.len(),
                top = top.as_ref().map(|e| e.preview.as_str()).unwrap_or(""),
                "Clipboard history changed"
            );
        }
    }
}
