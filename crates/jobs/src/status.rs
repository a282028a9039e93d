//! Aggregate status: the process-wide outstanding-item counter and the
//! observers (UI windows) that display it.
//!
//! Counter updates may come from any worker thread. Observers are only ever
//! called from a task queued on the UI bridge; at most one such notification
//! is pending at a time and it publishes whatever the count is when it runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{trace, warn};

use crate::ui::{JobList, UiBridge};

/// Receives aggregate status updates on the UI thread.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, status: &StatusSnapshot);
}

impl<F> StatusObserver for F
where
    F: Fn(&StatusSnapshot) + Send + Sync,
{
    fn status_changed(&self, status: &StatusSnapshot) {
        self(status)
    }
}

/// Point-in-time aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Work items not yet completed across all live jobs.
    pub outstanding: i64,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} items", self.outstanding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct StatusAggregator {
    outstanding: AtomicI64,
    observers: Mutex<HashMap<ObserverId, Arc<dyn StatusObserver>>>,
    next_observer: AtomicU64,
    notify_pending: AtomicBool,
    bridge: Arc<dyn UiBridge>,
}

impl StatusAggregator {
    pub fn new(bridge: Arc<dyn UiBridge>) -> Arc<Self> {
        Arc::new(Self {
            outstanding: AtomicI64::new(0),
            observers: Mutex::new(HashMap::new()),
            next_observer: AtomicU64::new(1),
            notify_pending: AtomicBool::new(false),
            bridge,
        })
    }

    pub fn outstanding(&self) -> i64 {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            outstanding: self.outstanding(),
        }
    }

    pub fn add_items(self: &Arc<Self>, n: i64) {
        if n <= 0 {
            return;
        }
        self.outstanding.fetch_add(n, Ordering::AcqRel);
        self.notify_observers();
    }

    /// Subtract `n` items; the counter saturates at zero.
    pub fn remove_items(self: &Arc<Self>, n: i64) {
        if n <= 0 {
            return;
        }
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current - n).max(0))
            })
            .unwrap_or_else(|current| current);
        if previous < n {
            warn!(previous, removed = n, "Outstanding item counter would go negative");
        }
        if previous != 0 {
            self.notify_observers();
        }
    }

    /// Ask the UI thread to publish the current status to every observer.
    pub fn notify_observers(self: &Arc<Self>) {
        if self.notify_pending.swap(true, Ordering::AcqRel) {
            trace!("Status notification already queued");
            return;
        }
        let this = Arc::clone(self);
        self.bridge
            .run_on_ui_thread(Box::new(move |_: &mut JobList| this.publish()));
    }

    /// Runs on the UI thread.
    fn publish(&self) {
        // Cleared before reading so a change racing with this publish queues
        // another notification instead of being lost.
        self.notify_pending.store(false, Ordering::Release);
        let status = self.snapshot();
        let observers: Vec<Arc<dyn StatusObserver>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for observer in observers {
            observer.status_changed(&status);
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn StatusObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, observer);
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
