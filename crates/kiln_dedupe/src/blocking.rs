//! Thread-blocking single-flight deduper.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Condvar, Mutex};

use tracing::debug;

use crate::error::DedupeError;
use crate::flight::{FlightTable, Latch, LeaderGuard, Outcome, Retention, Role};

/// Latch that parks threads on a condition variable.
pub(crate) struct BlockingLatch<V> {
    slot: Mutex<Option<V>>,
    ready: Condvar,
}

impl<V> Default for BlockingLatch<V> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

impl<V> Latch<V> for BlockingLatch<V> {
    fn settle(&self, value: V) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(value);
        }
        self.ready.notify_all();
    }
}

impl<V: Clone> BlockingLatch<V> {
    fn wait(&self) -> V {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = self.ready.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Collapses concurrent calls for the same key into one execution, blocking
/// the threads that wait.
///
/// ```
/// use kiln_dedupe::WorkDeduper;
///
/// let deduper: WorkDeduper<String, u32, String> = WorkDeduper::new();
/// let value = deduper.run("answer".to_string(), || Ok(42));
/// assert_eq!(value, Ok(42));
/// ```
pub struct WorkDeduper<K, T, E> {
    table: FlightTable<K, BlockingLatch<Outcome<T, E>>, T>,
}

impl<K, T, E> Default for WorkDeduper<K, T, E>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, E> WorkDeduper<K, T, E>
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

    /// Runs `work` for `key` unless a call for the same key is already in
    /// flight, in which case this thread blocks and receives that call's
    /// outcome instead.
    ///
    /// If the running call panics, every waiter receives
    /// [`DedupeError::Cancelled`] and the panic continues in the caller that
    /// ran the work.
    pub fn run<F>(&self, key: K, work: F) -> Result<T, DedupeError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        match self.table.join(&key) {
            Role::Settled(value) => Ok(value),
            Role::Follower(latch) => latch.wait(),
            Role::Leader(latch) => {
                debug!(key = %key, "running deduplicated work");
                let guard = LeaderGuard::new(&self.table, key, latch);
                let outcome = work().map_err(DedupeError::Failed);
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
    ///
    /// Calls already waiting still receive their leader's outcome.
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
