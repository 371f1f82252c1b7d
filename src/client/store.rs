//! Reactive state store
//!
//! One authoritative [`Snapshot`], a list of change listeners, and
//! equality-checked notification so redundant transitions are never
//! re-dispatched. The store has a single writer (the connection manager);
//! subscribers only read.

use super::state::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Handle returned by [`StateStore::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub struct StateStore {
    snapshot: Mutex<Snapshot>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl StateStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(initial),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Current snapshot, by value.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().unwrap().clone()
    }

    /// Register a change listener. The listener fires only on actual state
    /// changes, not on every write.
    pub fn subscribe(&self, listener: impl Fn(&Snapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().unwrap().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
    }

    /// Apply a mutation and notify listeners if anything actually changed.
    pub(crate) fn update(&self, mutate: impl FnOnce(&mut Snapshot)) {
        let changed = {
            let mut snapshot = self.snapshot.lock().unwrap();
            let before = snapshot.clone();
            mutate(&mut snapshot);
            (*snapshot != before).then(|| snapshot.clone())
        };
        if let Some(snapshot) = changed {
            let listeners: Vec<Listener> = self
                .listeners
                .lock()
                .unwrap()
                .iter()
                .map(|(_, l)| l.clone())
                .collect();
            for listener in listeners {
                listener(&snapshot);
            }
        }
    }
}
