//! Task-suspending single-flight deduper for async callers.

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::OnceLock;

use tokio::sync::Notify;
use tracing::debug;

use crate::error::DedupeError;
use crate::flight::{FlightTable, Latch, LeaderGuard, Outcome, Retention, Role};

/// Latch that parks tasks on a [`Notify`].
pub(crate) struct AsyncLatch<V> {
    slot: OnceLock<V>,
    ready: Notify,
}

impl<V> Default for AsyncLatch<V> {
    fn default() -> Self {
        Self {
            slot: OnceLock::new(),
            ready: Notify::new(),
        }
    }
}

impl<V> Latch<V> for AsyncLatch<V> {
    fn settle(&self, value: V) {
        let _ = self.slot.set(value);
        self.ready.notify_waiters();
    }
}

impl<V: Clone> AsyncLatch<V> {
    async fn wait(&self) -> V {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed.
            notified.as_mut().enable();
            if let Some(value) = self.slot.get() {
                return value.clone();
            }
            notified.await;
        }
    }
}

/// Async counterpart of [`WorkDeduper`](crate::WorkDeduper).
///
/// Waiting callers suspend instead of blocking their thread. If the future
/// running the work is dropped before it finishes, waiters receive
/// [`DedupeError::Cancelled`].
pub struct AsyncWorkDeduper<K, T, E> {
    table: FlightTable<K, AsyncLatch<Outcome<T, E>>, T>,
}

impl<K, T, E> Default for AsyncWorkDeduper<K, T, E>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, E> AsyncWorkDeduper<K, T, E>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
    E: Clone,
{
    /// Creates a deduper that forgets results once their flight lands.
    pub fn new() -> Self {
        Self::with_retention(Retention::InFlight)
    }

    /// Creates a deduper with the given retention policy.
    pub fn with_retention(retention: Retention) -> Self {
        Self {
            table: FlightTable::new(retention),
        }
    }

    /// Returns the retention policy.
    pub fn retention(&self) -> Retention {
        self.table.retention()
    }

    /// Awaits `work()` for `key` unless a call for the same key is already in
    /// flight, in which case this task waits for that call's outcome.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<T, DedupeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.table.join(&key) {
            Role::Settled(value) => Ok(value),
            Role::Follower(latch) => latch.wait().await,
            Role::Leader(latch) => {
                debug!(key = %key, "running deduplicated work");
                let guard = LeaderGuard::new(&self.table, key, latch);
                let outcome = work().await.map_err(DedupeError::Failed);
                guard.finish(outcome.clone());
                outcome
            }
        }
    }

    /// Returns `true` if a retained result exists for `key`.
    pub fn is_cached(&self, key: &K) -> bool {
        self.table.cached(key).is_some()
    }

    /// Returns the retained result for `key`.
    pub fn get_cached(&self, key: &K) -> Option<T> {
        self.table.cached(key)
    }

    /// Forgets retained results and in-flight registrations for one key, or
    /// for all keys when `key` is `None`.
    pub fn clear(&self, key: Option<&K>) {
        self.table.clear(key);
    }

    /// Number of keys with work in flight.
    pub fn pending_count(&self) -> usize {
        self.table.pending_count()
    }

    /// Number of retained results.
    pub fn cached_count(&self) -> usize {
        self.table.cached_count()
    }

    /// Number of callers waiting on the in-flight work for `key`.
    pub fn waiters(&self, key: &K) -> usize {
        self.table.waiters(key)
    }
}
