//! Bounded latest-value queue with versioned blocking waits

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An item paired with the queue version at which it was pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub item: T,
}

struct QueueState<T> {
    items: VecDeque<T>,
    /// Incremented on every push; never reset.
    version: u64,
    dropped: u64,
    closed: bool,
}

/// Capacity-bounded queue that favours the newest item.
pub struct LatestQueue<T> {
    state: Mutex<QueueState<T>>,
    cond: Condvar,
    capacity: usize,
}

impl<T: Clone> LatestQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                version: 0,
                dropped: 0,
                closed: false,
            }),
            cond: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| {
            tracing::warn!("[LatestQueue] Lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Push an item, evicting the oldest when full. Returns the new version,
    /// or `None` if the queue is closed.
    pub fn push(&self, item: T) -> Option<u64> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        if state.items.len() == self.capacity {
            state.items.pop_front();
            state.dropped += 1;
        }
        state.items.push_back(item);
        state.version += 1;
        let version = state.version;
        drop(state);
        self.cond.notify_all();
        Some(version)
    }

    /// Clone of the newest item without consuming anything.
    pub fn peek_latest(&self) -> Option<T> {
        self.lock().items.back().cloned()
    }

    /// Newest item and its version, without consuming anything.
    pub fn peek_versioned(&self) -> Option<Versioned<T>> {
        let state = self.lock();
        state.items.back().map(|item| Versioned {
            version: state.version,
            item: item.clone(),
        })
    }

    /// Remove and return the newest item, discarding everything older.
    pub fn take_latest(&self) -> Option<T> {
        let mut state = self.lock();
        let latest = state.items.pop_back();
        state.items.clear();
        latest
    }

    /// Block until an item newer than `last_version` exists, then return a
    /// clone of the newest one. Returns `None` on timeout or close.
    pub fn wait_newer(&self, last_version: u64, timeout: Duration) -> Option<Versioned<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.version > last_version {
                if let Some(item) = state.items.back() {
                    return Some(Versioned {
                        version: state.version,
                        item: item.clone(),
                    });
                }
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.cond.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Mark the queue closed and wake every waiter. Later pushes are refused.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Version of the most recent push (0 before any push).
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Items evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
