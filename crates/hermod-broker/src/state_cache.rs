//! In-process cache of the latest state per process.
//!
//! Fed by process-state log messages as they are persisted. Insertion order
//! is preserved for listing; a later state for the same process id replaces
//! the earlier one in place (last write wins, in queue FIFO order).

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

#[derive(Default)]
struct CacheInner {
    states: Vec<Value>,
    index: HashMap<String, usize>,
}

/// Last-known process states, keyed by process id.
#[derive(Default)]
pub struct ProcessStateCache {
    inner: Mutex<CacheInner>,
}

impl ProcessStateCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a state document for a process, replacing any prior entry.
    pub fn upsert(&self, process_id: &str, state: Value) {
        let mut inner = self.inner.lock();
        if let Some(&at) = inner.index.get(process_id) {
            inner.states[at] = state;
        } else {
            inner.states.push(state);
            let at = inner.states.len() - 1;
            let _ = inner.index.insert(process_id.to_owned(), at);
        }
    }

    /// The last-known state for a process.
    #[must_use]
    pub fn get(&self, process_id: &str) -> Option<Value> {
        let inner = self.inner.lock();
        inner.index.get(process_id).map(|&at| inner.states[at].clone())
    }

    /// Number of processes with a cached state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().states.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().states.is_empty()
    }

    /// All cached states, in first-seen order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.lock().states.clone()
    }
}
