//! Bookkeeping shared by the blocking and async dedupers.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::error::DedupeError;

/// What happens to a result once its flight lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Retention {
    /// Forget the result; the next call for the key runs the work again.
    #[default]
    InFlight,
    /// Keep successful results until cleared; later calls return them directly.
    Memoize,
}

pub(crate) type Outcome<T, E> = Result<T, DedupeError<E>>;

/// A one-shot slot that waiters block or suspend on.
pub(crate) trait Latch<V>: Default {
    /// Stores the value if none is stored yet and wakes every waiter.
    fn settle(&self, value: V);
}

struct Flight<L> {
    latch: Arc<L>,
    followers: usize,
}

struct TableState<K, L, T> {
    pending: HashMap<K, Flight<L>>,
    settled: HashMap<K, T>,
}

/// How a caller takes part in a call.
pub(crate) enum Role<L, T> {
    /// Runs the work and settles the latch.
    Leader(Arc<L>),
    /// Waits on the leader's latch.
    Follower(Arc<L>),
    /// A retained result is already available.
    Settled(T),
}

pub(crate) struct FlightTable<K, L, T> {
    state: Mutex<TableState<K, L, T>>,
    retention: Retention,
}

impl<K, L, T> FlightTable<K, L, T>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
{
    pub(crate) fn new(retention: Retention) -> Self {
        Self {
            state: Mutex::new(TableState {
                pending: HashMap::new(),
                settled: HashMap::new(),
            }),
            retention,
        }
    }

    pub(crate) fn retention(&self) -> Retention {
        self.retention
    }

    fn lock(&self) -> MutexGuard<'_, TableState<K, L, T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a caller for `key` and decides its role.
    pub(crate) fn join(&self, key: &K) -> Role<L, T>
    where
        L: Default,
    {
        let mut state = self.lock();
        if let Some(value) = state.settled.get(key) {
            return Role::Settled(value.clone());
        }
        if let Some(flight) = state.pending.get_mut(key) {
            flight.followers += 1;
            trace!(key = %key, followers = flight.followers, "joined in-flight work");
            return Role::Follower(Arc::clone(&flight.latch));
        }
        let latch = Arc::new(L::default());
        state.pending.insert(
            key.clone(),
            Flight {
                latch: Arc::clone(&latch),
                followers: 0,
            },
        );
        Role::Leader(latch)
    }

    /// Removes the flight for `key` and publishes its outcome.
    ///
    /// The table entry is only removed if it still belongs to `latch`; a
    /// `clear` may have detached it and a newer flight may own the key.
    pub(crate) fn complete<E>(&self, key: &K, latch: &Arc<L>, outcome: Outcome<T, E>)
    where
        L: Latch<Outcome<T, E>>,
    {
        {
            let mut state = self.lock();
            let owned = state
                .pending
                .get(key)
                .is_some_and(|f| Arc::ptr_eq(&f.latch, latch));
            if owned {
                state.pending.remove(key);
                if self.retention == Retention::Memoize {
                    if let Ok(value) = &outcome {
                        state.settled.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        latch.settle(outcome);
    }

    pub(crate) fn cached(&self, key: &K) -> Option<T> {
        self.lock().settled.get(key).cloned()
    }

    pub(crate) fn clear(&self, key: Option<&K>) {
        let mut state = self.lock();
        match key {
            Some(key) => {
                state.settled.remove(key);
                state.pending.remove(key);
            }
            None => {
                state.settled.clear();
                state.pending.clear();
            }
        }
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub(crate) fn cached_count(&self) -> usize {
        self.lock().settled.len()
    }

    pub(crate) fn waiters(&self, key: &K) -> usize {
        self.lock().pending.get(key).map_or(0, |f| f.followers)
    }
}

/// Settles a leader's latch with `Cancelled` unless the leader finished.
pub(crate) struct LeaderGuard<'a, K, L, T, E>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
    L: Latch<Outcome<T, E>>,
{
    table: &'a FlightTable<K, L, T>,
    key: K,
    latch: Arc<L>,
    finished: bool,
    _error: std::marker::PhantomData<fn() -> E>,
}

impl<'a, K, L, T, E> LeaderGuard<'a, K, L, T, E>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
    L: Latch<Outcome<T, E>>,
{
    pub(crate) fn new(table: &'a FlightTable<K, L, T>, key: K, latch: Arc<L>) -> Self {
        Self {
            table,
            key,
            latch,
            finished: false,
            _error: std::marker::PhantomData,
        }
    }

    pub(crate) fn finish(mut self, outcome: Outcome<T, E>) {
        self.finished = true;
        self.table.complete(&self.key, &self.latch, outcome);
    }
}

impl<K, L, T, E> Drop for LeaderGuard<'_, K, L, T, E>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
    L: Latch<Outcome<T, E>>,
{
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(key = %self.key, "leader abandoned in-flight work");
            let cancelled = Err(DedupeError::Cancelled {
                key: self.key.to_string(),
            });
            self.table.complete(&self.key, &self.latch, cancelled);
        }
    }
}
