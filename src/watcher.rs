use notify::{recommended_watcher, RecursiveMode, Result as NotifyResult, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::daemon::LoopEvent;

/// Burst of writes from an editor collapse into one event
const DEBOUNCE: Duration = Duration::from_millis(500);

/// How often the watch thread checks whether it should stop
const STOP_POLL: Duration = Duration::from_millis(200);

/// Watches one file and posts a [`LoopEvent`] when it is created, modified
/// or removed.
///
/// The parent directory is watched rather than the file itself, so the
/// file may be created or atomically replaced after startup.
pub struct FileWatcher {
    path: PathBuf,
    label: &'static str,
    make_event: fn() -> LoopEvent,
    events: Option<Sender<LoopEvent>>,
    stop_flag: Arc<AtomicBool>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl FileWatcher {
    /// Posts [`LoopEvent::ConfigChanged`] for the settings file
    pub fn config(path: PathBuf, events: Sender<LoopEvent>) -> Self {
        Self::new(path, "config", || LoopEvent::ConfigChanged, events)
    }

    /// Posts [`LoopEvent::RestoreRequested`] for the restore request file
    pub fn restore_requests(path: PathBuf, events: Sender<LoopEvent>) -> Self {
        Self::new(path, "restore", || LoopEvent::RestoreRequested, events)
    }

    fn new(
        path: PathBuf,
        label: &'static str,
        make_event: fn() -> LoopEvent,
        events: Sender<LoopEvent>,
    ) -> Self {
        FileWatcher {
            path,
            label,
            make_event,
            events: Some(events),
            stop_flag: Arc::new(AtomicBool::new(false)),
            watcher_thread: None,
        }
    }

    /// Start watching on a background thread.
    ///
    /// Returns once the OS watch is registered, so changes made after this
    /// call are seen.
    pub fn start(&mut self) -> NotifyResult<()> {
        let tx = self
            .events
            .take()
            .ok_or_else(|| std::io::Error::other("watcher already started"))?;

        let path = self.path.clone();
        let label = self.label;
        let make_event = self.make_event;
        let stop = self.stop_flag.clone();
        let (ready_tx, ready_rx) = channel();

        let thread_handle = thread::spawn(move || {
            let (watcher, watch_rx) = match Self::register(&path) {
                Ok(registered) => {
                    let _ = ready_tx.send(Ok(()));
                    registered
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            info!(path = %path.display(), watcher = label, "File watcher started");
            Self::watch_loop(&path, label, make_event, tx, &stop, watch_rx);
            drop(watcher);
            debug!(watcher = label, "File watcher shutting down");
        });

        self.watcher_thread = Some(thread_handle);
        ready_rx
            .recv()
            .map_err(|_| std::io::Error::other("watcher thread exited during setup"))?
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.watcher_thread.take() {
            if handle.join().is_err() {
                warn!(watcher = self.label, "File watcher thread panicked");
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn register(
        path: &Path,
    ) -> NotifyResult<(Box<dyn Watcher>, Receiver<notify::Result<notify::Event>>)> {
        let watch_path = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(watch_path)?;

        let (watch_tx, watch_rx) = channel();
        let mut watcher: Box<dyn Watcher> = Box::new(recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                let _ = watch_tx.send(res);
            },
        )?);
        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
        Ok((watcher, watch_rx))
    }

    fn watch_loop(
        path: &Path,
        label: &'static str,
        make_event: fn() -> LoopEvent,
        tx: Sender<LoopEvent>,
        stop: &AtomicBool,
        watch_rx: Receiver<notify::Result<notify::Event>>,
    ) {
        let file_name: Option<OsString> = path.file_name().map(|n| n.to_os_string());
        let debounce_active = Arc::new(AtomicBool::new(false));

        while !stop.load(Ordering::Relaxed) {
            match watch_rx.recv_timeout(STOP_POLL) {
                Ok(Ok(event)) => {
                    let is_target = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    let is_relevant_event = matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    );

                    if is_target
                        && is_relevant_event
                        && debounce_active
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                    {
                        let tx_clone = tx.clone();
                        let debounce_flag = debounce_active.clone();
                        thread::spawn(move || {
                            thread::sleep(DEBOUNCE);
                            debounce_flag.store(false, Ordering::Release);
                            if tx_clone.send(make_event()).is_ok() {
                                info!(watcher = label, "Watched file changed, emitting event");
                            }
                        });
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, watcher = label, "File watcher error");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
