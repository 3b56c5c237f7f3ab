//! Periodic age-based expiry of unpinned history entries
//!
//! The scheduler does not own a timer. The event loop asks
//! [`ExpirationScheduler::time_until_due`] how long it may block and calls
//! [`ExpirationScheduler::tick`] when it wakes.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::image_cache::ImageCache;
use super::store::HistoryStore;
use crate::error::{Result, ResultExt};

/// How often the sweep runs
pub const EXPIRE_INTERVAL: Duration = Duration::from_secs(60 * 60);

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Entries captured before this instant (seconds since epoch) are expired.
/// `None` when expiry is disabled.
pub fn expiry_cutoff(auto_expire_days: u32, now: f64) -> Option<f64> {
    (auto_expire_days > 0).then(|| now - f64::from(auto_expire_days) * SECONDS_PER_DAY)
}

pub struct ExpirationScheduler {
    auto_expire_days: u32,
    interval: Duration,
    next_due: Instant,
    image_cache: Option<ImageCache>,
}

impl ExpirationScheduler {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            auto_expire_days: 0,
            interval,
            next_due: now + interval,
            image_cache: None,
        }
    }

    /// Also remove cached images no entry references after each sweep
    pub fn with_image_sweep(mut self, cache: ImageCache) -> Self {
        self.image_cache = Some(cache);
        self
    }

    pub fn auto_expire_days(&self) -> u32 {
        self.auto_expire_days
    }

    /// Apply a new threshold and sweep right away. Returns entries expired.
    pub fn configure(
        &mut self,
        auto_expire_days: u32,
        store: &mut HistoryStore,
        now: Instant,
        wall_now: f64,
    ) -> Result<usize> {
        if auto_expire_days != self.auto_expire_days {
            info!(auto_expire_days, "Clipboard auto-expiry reconfigured");
        }
        self.auto_expire_days = auto_expire_days;
        self.next_due = now + self.interval;
        self.run_once(store, wall_now)
    }

    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Run the sweep if it is due. Returns `None` when it was not.
    pub fn tick(
        &mut self,
        store: &mut HistoryStore,
        now: Instant,
        wall_now: f64,
    ) -> Option<Result<usize>> {
        if now < self.next_due {
            return None;
        }
        self.next_due = now + self.interval;
        Some(self.run_once(store, wall_now))
    }

    /// Expire aged entries, then sweep orphaned images
    pub fn run_once(&mut self, store: &mut HistoryStore, wall_now: f64) -> Result<usize> {
        let expired = match expiry_cutoff(self.auto_expire_days, wall_now) {
            Some(older_than) => store.expire(older_than)?,
            None => 0,
        };

        if let Some(cache) = &self.image_cache {
            let live = store.live_image_hashes();
            if let Some(swept) = cache.sweep_orphans(&live).warn_on_err() {
                debug!(swept, "Image cache sweep finished");
            }
        }

        if expired > 0 {
            info!(expired, days = self.auto_expire_days, "Expired old clipboard entries");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::database::Database;
    use crate::clipboard_history::image_cache::ClipImage;
    use crate::clipboard_history::types::ClipEntry;

    const DAY: f64 = SECONDS_PER_DAY;
    const NOW: f64 = 1_700_000_000.0;

    fn store_with_ages(ages_in_days: &[f64]) -> HistoryStore {
        let mut store = HistoryStore::open(Database::open_in_memory().unwrap(), 100).unwrap();
        for (i, age) in ages_in_days.iter().enumerate() {
            store
                .add(ClipEntry::text(&format!("entry {}", i), NOW - age * DAY).unwrap())
                .unwrap();
        }
        store
    }

    #[test]
    fn test_cutoff() {
        assert_eq!(expiry_cutoff(0, NOW), None);
        assert_eq!(expiry_cutoff(2, NOW), Some(NOW - 2.0 * DAY));
    }

    #[test]
    fn test_configure_runs_immediately() {
        let mut store = store_with_ages(&[0.5, 3.0, 10.0]);
        let start = Instant::now();
        let mut scheduler = ExpirationScheduler::new(EXPIRE_INTERVAL, start);

        assert_eq!(scheduler.configure(0, &mut store, start, NOW).unwrap(), 0);
        assert_eq!(store.len(), 3);

        assert_eq!(scheduler.configure(7, &mut store, start, NOW).unwrap(), 1);
        assert_eq!(store.len(), 2);

        // Lowering the threshold takes effect without waiting for a tick
        assert_eq!(scheduler.configure(1, &mut store, start, NOW).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(scheduler.auto_expire_days(), 1);
    }

    #[test]
    fn test_pinned_entries_survive_expiry() {
        let mut store = store_with_ages(&[30.0, 40.0]);
        let pinned = store.search("entry 0")[0].id.clone();
        store.toggle_pin(&pinned).unwrap();

        let start = Instant::now();
        let mut scheduler = ExpirationScheduler::new(EXPIRE_INTERVAL, start);
        scheduler.configure(1, &mut store, start, NOW).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get(&pinned).is_some());
    }

    #[test]
    fn test_tick_only_runs_when_due() {
        let mut store = store_with_ages(&[]);
        let start = Instant::now();
        let mut scheduler = ExpirationScheduler::new(Duration::from_secs(60), start);
        scheduler.configure(1, &mut store, start, NOW).unwrap();

        assert_eq!(scheduler.time_until_due(start), Duration::from_secs(60));
        assert!(scheduler.tick(&mut store, start + Duration::from_secs(30), NOW).is_none());

        // An entry ages past the threshold between ticks
        store
            .add(ClipEntry::text("stale", NOW - 2.0 * DAY).unwrap())
            .unwrap();
        let due = start + Duration::from_secs(60);
        assert_eq!(scheduler.tick(&mut store, due, NOW).unwrap().unwrap(), 1);
        assert_eq!(scheduler.time_until_due(due), Duration::from_secs(60));
        assert_eq!(
            scheduler.time_until_due(due + Duration::from_secs(90)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_run_sweeps_orphaned_images() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ImageCache::open(dir.path()).unwrap();
        let mut store = HistoryStore::open(Database::open_in_memory().unwrap(), 100).unwrap();

        let kept = ClipImage::new(1, 1, vec![1, 1, 1, 255]);
        let (kept_path, kept_hash) = cache.store(&kept);
        store
            .add(ClipEntry::image(kept_path.clone(), kept_hash, 1, 1, NOW))
            .unwrap();
        let (orphan_path, _) = cache.store(&ClipImage::new(1, 1, vec![2, 2, 2, 255]));

        let start = Instant::now();
        let mut scheduler = ExpirationScheduler::new(EXPIRE_INTERVAL, start).with_image_sweep(cache);
        scheduler.run_once(&mut store, NOW).unwrap();

        assert!(kept_path.exists());
        assert!(!orphan_path.exists());
    }
}
