//! Process-wide, tag-keyed counters. Matches the `Counter`/`Flush`
//! contract: `increment` is a single atomic add, `flush` atomically swaps
//! the running total out into a lifetime total and reports the delta.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// A single named counter: `curr` accumulates since the last flush,
/// `total` accumulates across the counter's lifetime.
pub struct Counter {
    tag: String,
    curr: AtomicU64,
    total: AtomicU64,
}

impl Counter {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            curr: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn increment(&self) {
        self.curr.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.curr.fetch_add(n, Ordering::Relaxed);
    }

    /// Atomically swaps `curr` for 0 and folds the old value into `total`.
    /// Returns the delta that was flushed.
    pub fn flush(&self) -> u64 {
        let delta = self.curr.swap(0, Ordering::Relaxed);
        self.total.fetch_add(delta, Ordering::Relaxed);
        delta
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// A registry of [`Counter`]s keyed by tag, created lazily on first
/// `increment`/`add`.
#[derive(Default)]
pub struct CounterRegistry {
    counters: RwLock<HashMap<String, std::sync::Arc<Counter>>>,
    // Serializes counter creation so two threads registering the same new
    // tag concurrently don't race to insert two different Counters.
    create_lock: Mutex<()>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, tag: &str) -> std::sync::Arc<Counter> {
        if let Some(counter) = self.counters.read().unwrap().get(tag) {
            return counter.clone();
        }
        let _guard = self.create_lock.lock().unwrap();
        let mut counters = self.counters.write().unwrap();
        counters
            .entry(tag.to_string())
            .or_insert_with(|| std::sync::Arc::new(Counter::new(tag)))
            .clone()
    }

    pub fn increment(&self, tag: &str) {
        self.counter(tag).increment();
    }

    /// Flushes every registered counter, logging each nonzero delta.
    pub fn flush_all(&self) {
        for counter in self.counters.read().unwrap().values() {
            let delta = counter.flush();
            if delta > 0 {
                log::info!("counter {} +{} (total {})", counter.tag(), delta, counter.total());
            }
        }
    }

    pub fn total(&self, tag: &str) -> u64 {
        self.counters
            .read()
            .unwrap()
            .get(tag)
            .map(|c| c.total())
            .unwrap_or(0)
    }
}

/// Runs `registry.flush_all()` once per second until `shutdown` fires.
pub async fn run_flush_loop(
    registry: std::sync::Arc<CounterRegistry>,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = interval.tick() => registry.flush_all(),
            _ = &mut shutdown => {
                log::info!("counter flush loop shutting down");
                return;
            }
        }
    }
}
