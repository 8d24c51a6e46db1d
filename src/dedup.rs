//! Duplicate-request gate.
//!
//! Keyed by the caller's image reference string. A key accepted less than
//! one window ago rejects every further request for the same key until the
//! window passes; acceptance records (or refreshes) the key's timestamp.
//! Identical image bytes behind different reference strings are distinct
//! keys on purpose.
//!
//! The table is self-expiring: [`spawn_sweep`] runs [`Deduplicator::sweep_once`]
//! on a fixed cadence below the window and drops stale entries. The gate
//! itself performs no I/O and holds no await point, so a check-and-record
//! can never interleave with another request's.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub struct Deduplicator {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Deduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Gate an incoming request. Returns `true` when `key` was accepted
    /// inside the window; otherwise records `key` as accepted now
    /// (overwriting any stale timestamp) and returns `false`.
    pub fn should_reject(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        if let Some(accepted) = seen.get(key) {
            if now.duration_since(*accepted) < self.window {
                return true;
            }
        }
        seen.insert(key.to_string(), now);
        false
    }

    /// Drop every entry older than the window. A single `now` is taken at
    /// sweep start, so an entry accepted while the sweep runs is never the
    /// one removed.
    pub fn sweep_once(&self) {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        seen.retain(|_, accepted| now.duration_since(*accepted) < self.window);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard for the background sweep task; aborts the task when dropped.
pub struct SweepHandle {
    task: JoinHandle<()>,
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Schedule [`Deduplicator::sweep_once`] at a fixed cadence. The task holds
/// only a weak reference and exits once the deduplicator is gone.
pub fn spawn_sweep(dedup: &Arc<Deduplicator>, every: Duration) -> SweepHandle {
    let weak: Weak<Deduplicator> = Arc::downgrade(dedup);
    let task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match weak.upgrade() {
                Some(dedup) => dedup.sweep_once(),
                None => break,
            }
        }
    });
    SweepHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const WINDOW: Duration = Duration::from_millis(3000);

    #[tokio::test(start_paused = true)]
    async fn rejects_within_window_accepts_after() {
        let dedup = Deduplicator::new(WINDOW);

        assert!(!dedup.should_reject("img1"));
        advance(Duration::from_millis(1000)).await;
        assert!(dedup.should_reject("img1"));
        advance(Duration::from_millis(2100)).await;
        assert!(!dedup.should_reject("img1"));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_are_independent() {
        let dedup = Deduplicator::new(WINDOW);

        assert!(!dedup.should_reject("img1"));
        assert!(!dedup.should_reject("img2"));
        assert!(dedup.should_reject("img1"));
        assert!(dedup.should_reject("img2"));
    }

    #[tokio::test(start_paused = true)]
    async fn acceptance_refreshes_the_window() {
        let dedup = Deduplicator::new(WINDOW);

        assert!(!dedup.should_reject("img1"));
        advance(Duration::from_millis(3100)).await;
        assert!(!dedup.should_reject("img1"));
        // Window restarted at the second acceptance.
        advance(Duration::from_millis(2900)).await;
        assert!(dedup.should_reject("img1"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_stale_entries() {
        let dedup = Deduplicator::new(WINDOW);

        assert!(!dedup.should_reject("old"));
        advance(Duration::from_millis(2900)).await;
        assert!(!dedup.should_reject("fresh"));
        advance(Duration::from_millis(200)).await;

        dedup.sweep_once();
        assert_eq!(dedup.len(), 1);
        assert!(dedup.should_reject("fresh"));
        assert!(!dedup.should_reject("old"));
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_bounds_the_table_and_stops_on_drop() {
        let dedup = Arc::new(Deduplicator::new(Duration::from_millis(100)));
        let guard = spawn_sweep(&dedup, Duration::from_millis(50));

        assert!(!dedup.should_reject("k"));
        advance(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;
        assert!(dedup.is_empty());

        drop(guard);
        assert!(!dedup.should_reject("again"));
        advance(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;
        assert_eq!(dedup.len(), 1);
    }
}
