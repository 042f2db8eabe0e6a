//! The LRU lifecycle manager (§4.8): bounds how many indexes stay open at
//! once, and periodically closes ones that have gone idle.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::registry::Registry;

/// Maximum number of indexes the LRU keeps open before evicting the oldest.
const MAX_SIZE: usize = 20;

/// Tracks (indexName, lastAccessTime) for up to `MAX_SIZE` indexes, plus the
/// "expired" set of names evicted from that bound but not yet closed. A
/// background ticker (started only when `lru_minutes > 0`, §4.9) drains both
/// against a rolling cutoff.
pub struct Lru {
    entries: Arc<Mutex<IndexMap<String, Instant>>>,
    expired: Arc<Mutex<HashMap<String, Instant>>>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Lru {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(IndexMap::new())),
            expired: Arc::new(Mutex::new(HashMap::new())),
            stop_tx: Mutex::new(None),
            ticker: Mutex::new(None),
        }
    }

    /// Record an access to `index`: move it to the most-recently-used end,
    /// clear any stale "expired" entry for it, and evict the oldest entry
    /// into "expired" if this push exceeded `MAX_SIZE` (§4.8).
    pub fn touch(&self, index: &str) {
        self.expired.lock().expect("lru lock poisoned").remove(index);

        let mut entries = self.entries.lock().expect("lru lock poisoned");
        entries.shift_remove(index);
        entries.insert(index.to_string(), Instant::now());

        if entries.len() > MAX_SIZE
            && let Some((name, accessed_at)) = entries.shift_remove_index(0)
        {
            drop(entries);
            self.expired.lock().expect("lru lock poisoned").insert(name, accessed_at);
        }
    }

    /// Spawn the periodic eviction ticker. A no-op if `lru_minutes <= 0`
    /// (callers are expected to check that before calling, per §4.9).
    pub fn start_ticker(&self, registry: Arc<Registry>, lru_minutes: i64) {
        let period = Duration::from_secs(lru_minutes.max(1).unsigned_abs() * 60);
        let (tx, rx) = mpsc::channel();
        *self.stop_tx.lock().expect("lru lock poisoned") = Some(tx);

        let entries = Arc::clone(&self.entries);
        let expired = Arc::clone(&self.expired);
        let handle = thread::spawn(move || run_ticker(&registry, &entries, &expired, period, &rx));
        *self.ticker.lock().expect("lru lock poisoned") = Some(handle);
    }

    /// Signal the ticker thread to stop and join it. A no-op if never started.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().expect("lru lock poisoned").take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.ticker.lock().expect("lru lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Default for Lru {
    fn default() -> Self {
        Self::new()
    }
}

fn run_ticker(
    registry: &Arc<Registry>,
    entries: &Arc<Mutex<IndexMap<String, Instant>>>,
    expired: &Arc<Mutex<HashMap<String, Instant>>>,
    period: Duration,
    stop_rx: &Receiver<()>,
) {
    loop {
        match stop_rx.recv_timeout(period) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let cutoff = Instant::now() - period;
                tick(registry, entries, expired, cutoff);
            }
        }
    }
}

/// One ticker pass (§4.8): drain stale "expired" entries, then check the
/// single oldest LRU entry against `cutoff`.
fn tick(
    registry: &Registry,
    entries: &Mutex<IndexMap<String, Instant>>,
    expired: &Mutex<HashMap<String, Instant>>,
    cutoff: Instant,
) {
    let stale: Vec<String> = {
        let mut expired = expired.lock().expect("lru lock poisoned");
        let stale: Vec<String> = expired
            .iter()
            .filter(|&(_, &accessed_at)| accessed_at < cutoff)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            expired.remove(name);
        }
        stale
    };
    for name in stale {
        tracing::info!(index = %name, "LRU closing expired index");
        registry.remove_indexer(&name);
    }

    let oldest = {
        let mut entries = entries.lock().expect("lru lock poisoned");
        match entries.get_index(0) {
            Some((name, &accessed_at)) if accessed_at < cutoff => {
                let name = name.clone();
                entries.shift_remove(&name);
                Some(name)
            }
            _ => None,
        }
    };
    if let Some(name) = oldest {
        tracing::info!(index = %name, "LRU closing idle index");
        registry.remove_indexer(&name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_keeps_most_recent_at_the_back() {
        let lru = Lru::new();
        lru.touch("a");
        lru.touch("b");
        let entries = lru.entries.lock().unwrap();
        assert_eq!(entries.get_index(0).unwrap().0, "a");
        assert_eq!(entries.get_index(1).unwrap().0, "b");
    }

    #[test]
    fn re_touching_moves_entry_to_the_back() {
        let lru = Lru::new();
        lru.touch("a");
        lru.touch("b");
        lru.touch("a");
        let entries = lru.entries.lock().unwrap();
        assert_eq!(entries.get_index(0).unwrap().0, "b");
        assert_eq!(entries.get_index(1).unwrap().0, "a");
    }

    #[test]
    fn overflow_evicts_oldest_into_expired() {
        let lru = Lru::new();
        for i in 0..(MAX_SIZE + 1) {
            lru.touch(&format!("idx{i}"));
        }
        assert_eq!(lru.entries.lock().unwrap().len(), MAX_SIZE);
        assert!(lru.expired.lock().unwrap().contains_key("idx0"));
    }

    #[test]
    fn touching_an_expired_entry_clears_it() {
        let lru = Lru::new();
        for i in 0..(MAX_SIZE + 1) {
            lru.touch(&format!("idx{i}"));
        }
        assert!(lru.expired.lock().unwrap().contains_key("idx0"));
        lru.touch("idx0");
        assert!(!lru.expired.lock().unwrap().contains_key("idx0"));
    }
}
