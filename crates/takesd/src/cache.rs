//! Single-flight TTL cache for external lookups.
//!
//! Used for display-name resolution: many commands can ask for the same
//! user's name at once, and the backing lookup is slow and rate-limited.
//! The cache coalesces concurrent fetches for one key into a single
//! in-flight request; every waiter gets the same result. Entries expire
//! after a TTL and failures are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Cache slot: either a resolved value or a fetch in flight.
enum Slot<V> {
    Ready { value: V, fetched_at: Instant },
    /// Waiters hold a receiver; the fetching task publishes the outcome.
    /// `None` in the channel means the fetch failed.
    Pending(watch::Receiver<Option<V>>),
}

/// TTL cache that coalesces concurrent fetches per key.
pub struct SingleFlightCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, fetching it with `fetch` on a
    /// miss. Concurrent callers for the same key share one fetch.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error to every waiting caller. The failed
    /// entry is removed, so the next call retries.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> anyhow::Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        // Fast path plus pending-slot registration under one lock.
        let mut entries = self.entries.lock().await;

        let fresh = match entries.get(&key) {
            Some(Slot::Ready { value, fetched_at }) if fetched_at.elapsed() < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        };
        if let Some(value) = fresh {
            return Ok(value);
        }

        let in_flight = match entries.get(&key) {
            Some(Slot::Pending(rx)) => Some(rx.clone()),
            _ => None,
        };
        if let Some(mut rx) = in_flight {
            drop(entries);
            // Another caller is fetching; wait for its outcome.
            if rx.changed().await.is_err() {
                // The fetching caller was cancelled; clear the stale slot.
                self.entries.lock().await.remove(&key);
                return Err(anyhow::anyhow!("in-flight fetch was dropped"));
            }
            let outcome = rx.borrow().clone();
            return outcome.ok_or_else(|| anyhow::anyhow!("shared fetch failed"));
        }

        let (tx, rx) = watch::channel(None);
        entries.insert(key.clone(), Slot::Pending(rx));
        // Hold the sender outside the lock while fetching.
        drop(entries);
        self.fetch_and_publish(key, fetch, tx).await
    }

    async fn fetch_and_publish<F, Fut>(
        &self,
        key: K,
        fetch: F,
        tx: watch::Sender<Option<V>>,
    ) -> anyhow::Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        match fetch().await {
            Ok(value) => {
                let mut entries = self.entries.lock().await;
                entries.insert(
                    key,
                    Slot::Ready {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                let _ = tx.send(Some(value.clone()));
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "Cache fetch failed");
                let mut entries = self.entries.lock().await;
                entries.remove(&key);
                let _ = tx.send(None);
                Err(e)
            }
        }
    }

    /// Drops one entry, forcing the next lookup to refetch.
    pub async fn invalidate(&self, key: &K) {
        self.entries.lock().await.remove(key);
    }
}
