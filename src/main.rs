use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use clipnote::clipboard_history::{
    default_db_path, default_image_dir, now_secs, ArboardSource, ChangePoller, ClipEntry,
    ClipboardCapture, Database, ExpirationScheduler, HistoryStore, ImageCache, EXPIRE_INTERVAL,
};
use clipnote::config::{config_path, load_config, save_config};
use clipnote::daemon::{
    request_restore, restore_request_path, withdraw_restore_request, Daemon,
};
use clipnote::logging;
use clipnote::notes;
use clipnote::watcher::FileWatcher;

/// How long `restore` waits for a running daemon to claim its request
const DAEMON_CLAIM_TIMEOUT: Duration = Duration::from_secs(2);

/// Entries older than this show a date instead of a relative label
const RELATIVE_LABEL_MAX_SECS: f64 = 7.0 * 86_400.0;

#[derive(Parser)]
#[command(name = "clipnote")]
#[command(about = "Clipboard history and notes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture clipboard changes until interrupted
    Watch,
    /// List history, pinned first then newest
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Case-insensitive substring search
    Search { query: String },
    /// Toggle the pinned flag of an entry
    Pin { id: String },
    Remove { id: String },
    /// Remove unpinned entries (or everything)
    Clear {
        #[arg(long)]
        include_pinned: bool,
    },
    /// Put an entry back on the system clipboard
    Restore { id: String },
    /// Change the history bound and persist it to the config file
    MaxItems { count: usize },
    #[command(subcommand)]
    Note(NoteCommands),
}

#[derive(Subcommand)]
enum NoteCommands {
    Add {
        title: String,
        #[arg(default_value = "")]
        body: String,
    },
    List,
    Remove { id: String },
    /// Toggle the pinned flag of a note
    Pin { id: String },
    Color { id: String, color: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init();

    match cli.command {
        Commands::Watch => run_watch(),
        Commands::List { limit } => {
            let store = open_store()?;
            print_entries(&store.get_all(), limit);
            Ok(())
        }
        Commands::Search { query } => {
            let store = open_store()?;
            print_entries(&store.search(&query), None);
            Ok(())
        }
        Commands::Pin { id } => {
            let pinned = open_store()?.toggle_pin(&id)?;
            println!("{} {}", if pinned { "Pinned" } else { "Unpinned" }, id);
            Ok(())
        }
        Commands::Remove { id } => {
            if !open_store()?.remove(&id)? {
                bail!("No clipboard entry with id {}", id);
            }
            Ok(())
        }
        Commands::Clear { include_pinned } => {
            let removed = open_store()?.clear(!include_pinned)?;
            println!("Removed {} entries", removed);
            Ok(())
        }
        Commands::Restore { id } => run_restore(&id),
        Commands::MaxItems { count } => {
            let path = config_path();
            let mut config = load_config();
            config.max_history_items = count;
            let trimmed = open_store()?.set_max_items(count)?;
            save_config(&path, &config)?;
            println!("History bound set to {} ({} entries trimmed)", count, trimmed);
            Ok(())
        }
        Commands::Note(command) => run_note(command),
    }
}

fn open_store() -> Result<HistoryStore> {
    let config = load_config();
    let db = Database::open(&default_db_path())?;
    Ok(HistoryStore::open(db, config.max_history_items)?)
}

fn run_watch() -> Result<()> {
    let config = load_config();
    let config_path = config_path();
    let (tx, rx) = mpsc::channel();

    let cache = ImageCache::open(default_image_dir())?;
    let source = ArboardSource::new(tx.clone()).context("Failed to open the system clipboard")?;
    let capture = ClipboardCapture::new(source, cache.clone());
    let store = open_store()?;
    let scheduler = ExpirationScheduler::new(EXPIRE_INTERVAL, Instant::now()).with_image_sweep(cache);

    let request_path = restore_request_path();
    // A request left over from an earlier session is stale
    withdraw_restore_request(&request_path)?;

    let _poller = ChangePoller::spawn(tx.clone(), config.poll_interval());
    let mut config_watcher = FileWatcher::config(config_path.clone(), tx.clone());
    config_watcher.start()?;
    let mut request_watcher = FileWatcher::restore_requests(request_path.clone(), tx);
    request_watcher.start()?;

    info!(config = %config_path.display(), "Watching clipboard");
    Daemon::new(store, capture, scheduler, config, config_path, rx)
        .with_restore_requests(request_path)
        .run();
    Ok(())
}

/// Hand the restore to a running daemon, so its echo handling applies.
/// Without one, write the clipboard from this process.
fn run_restore(id: &str) -> Result<()> {
    let config = load_config();
    let mut store = open_store()?;
    let Some(entry) = store.get(id).cloned() else {
        bail!("No clipboard entry with id {}", id);
    };

    let request_path = restore_request_path();
    request_restore(&request_path, id)?;
    let deadline = Instant::now() + DAEMON_CLAIM_TIMEOUT;
    while Instant::now() < deadline && request_path.exists() {
        thread::sleep(Duration::from_millis(100));
    }
    if !withdraw_restore_request(&request_path)? {
        println!("Restored {} (via running daemon)", entry.preview);
        return Ok(());
    }

    // No daemon: read completions are never requested, so the receiver is unused
    let (tx, _rx) = mpsc::channel();
    let source = ArboardSource::new(tx)?;
    let mut capture = ClipboardCapture::new(source, ImageCache::open(default_image_dir())?);
    capture.restore(&entry)?;

    if config.clear_on_paste {
        store.remove(&entry.id)?;
    }
    println!("Restored {}", entry.preview);
    Ok(())
}

fn run_note(command: NoteCommands) -> Result<()> {
    let db = Database::open(&default_db_path())?;
    match command {
        NoteCommands::Add { title, body } => {
            let note = notes::add_note(&db, &title, &body, now_secs())?;
            println!("{}", note.id);
        }
        NoteCommands::List => {
            for note in notes::get_all_notes(&db)? {
                let pin = if note.pinned { "*" } else { " " };
                println!("{} {} [{}] {}", pin, note.id, note.color, note.display_title());
            }
        }
        NoteCommands::Remove { id } => {
            if !notes::delete_note(&db, &id)? {
                bail!("No note with id {}", id);
            }
        }
        NoteCommands::Pin { id } => match notes::toggle_note_pinned(&db, &id)? {
            Some(pinned) => println!("{} {}", if pinned { "Pinned" } else { "Unpinned" }, id),
            None => bail!("No note with id {}", id),
        },
        NoteCommands::Color { id, color } => {
            if !notes::set_note_color(&db, &id, &color)? {
                bail!("No note with id {}", id);
            }
        }
    }
    Ok(())
}

fn print_entries(entries: &[ClipEntry], limit: Option<usize>) {
    let now = now_secs();
    for entry in entries.iter().take(limit.unwrap_or(usize::MAX)) {
        let pin = if entry.pinned { "*" } else { " " };
        println!(
            "{} {} {:<5} {:>10}  {}",
            pin,
            entry.id,
            entry.kind().as_str(),
            when(entry, now),
            entry.preview
        );
    }
}

fn when(entry: &ClipEntry, now: f64) -> String {
    if now - entry.created_at < RELATIVE_LABEL_MAX_SECS {
        return entry.relative_time(now);
    }
    entry
        .created_at_local()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
