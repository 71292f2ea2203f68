//! Scratch-object pool.
//!
//! Grounded on an established thread-local + shared-structure combination
//! (`block_filter::engine`'s `GROUP_L0` thread-local cache) generalized to a
//! plain free-list backed by a lock-free queue
//! ("a thread-safe free-list; `get()` returns a cleared object, `put(obj)`
//! reinserts it"). Using pools is an optimization; correctness does not
//! depend on it.

use crossbeam_queue::ArrayQueue;
use std::sync::Arc;

/// A bounded free-list of reusable `T`s.
///
/// `get()` pops a pooled instance if one is available, otherwise calls
/// `make`. Callers are responsible for resetting the object's state before
/// reuse (via `T::reset` or equivalent) — the pool itself does not clear
/// anything on `get()`.
pub struct Pool<T> {
    free: ArrayQueue<T>,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
        }
    }

    pub fn get(&self, make: impl FnOnce() -> T) -> T {
        self.free.pop().unwrap_or_else(make)
    }

    /// Return `obj` to the pool. Silently drops it if the pool is full.
    pub fn put(&self, obj: T) {
        let _ = self.free.push(obj);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

pub fn shared_pool<T>(capacity: usize) -> Arc<Pool<T>> {
    Arc::new(Pool::new(capacity))
}
