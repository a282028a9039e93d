//! UI handoff bridge and the UI-owned job list.
//!
//! Worker threads never touch [`JobList`] directly. They queue [`UiTask`]s
//! through a [`UiBridge`]; the UI thread owns a [`UiLoop`] and applies the
//! tasks in FIFO order. A task whose target row is already gone is a no-op.

use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::job::{JobHandle, JobId};

/// A deferred mutation of UI-owned state, run exactly once on the UI thread.
pub type UiTask = Box<dyn FnOnce(&mut JobList) + Send + 'static>;

/// Schedules work on the single UI thread.
pub trait UiBridge: Send + Sync {
    fn run_on_ui_thread(&self, task: UiTask);
}

/// Sending half of the UI queue; handed to the scheduler.
#[derive(Clone)]
pub struct UiSender {
    tx: mpsc::UnboundedSender<UiTask>,
}

impl UiBridge for UiSender {
    fn run_on_ui_thread(&self, task: UiTask) {
        if self.tx.send(task).is_err() {
            trace!("UI loop is gone, dropping request");
        }
    }
}

/// Create a UI queue. The [`UiLoop`] must stay on the UI thread.
pub fn ui_channel() -> (UiSender, UiLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        UiSender { tx },
        UiLoop {
            rx,
            list: JobList::default(),
        },
    )
}

/// Receiving half of the UI queue together with the state it mutates.
pub struct UiLoop {
    rx: mpsc::UnboundedReceiver<UiTask>,
    list: JobList,
}

impl UiLoop {
    /// Apply every queued task. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(&mut self.list);
            applied += 1;
        }
        applied
    }

    /// Drain every `tick` until `done` returns true or `timeout` expires.
    /// Returns whether `done` was satisfied.
    pub fn run_until<F>(&mut self, tick: Duration, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&JobList) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if done(&self.list) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(tick);
        }
    }

    pub fn list(&self) -> &JobList {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut JobList {
        &mut self.list
    }
}

/// One visible row of the jobs window.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: JobId,
    pub title: String,
    /// Percent complete, 0 to 100.
    pub progress: f64,
    handle: JobHandle,
}

impl JobRow {
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }
}

/// The jobs window model. Rows are kept in submission order.
#[derive(Debug, Default)]
pub struct JobList {
    rows: IndexMap<JobId, JobRow>,
}

impl JobList {
    /// Add the row for a new job, unless the job was cancelled before the
    /// request got here.
    pub(crate) fn insert(&mut self, handle: JobHandle) {
        if !handle.is_attached() {
            debug!(job = %handle.id(), "Job cancelled before its row was shown");
            return;
        }
        let row = JobRow {
            id: handle.id(),
            title: handle.title().to_string(),
            progress: 0.0,
            handle,
        };
        self.rows.insert(row.id, row);
    }

    pub(crate) fn set_progress(&mut self, id: JobId, percent: f64) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.progress = percent;
        }
    }

    pub(crate) fn remove(&mut self, id: JobId) -> bool {
        self.rows.shift_remove(&id).is_some()
    }

    /// Drop every row without touching the jobs (used at shutdown).
    pub(crate) fn clear(&mut self) {
        self.rows.clear();
    }

    /// "Cancel" on a selected row: the row disappears immediately and the
    /// job is asked to stop. The worker finishes on its own time.
    pub fn cancel(&mut self, id: JobId) -> bool {
        match self.rows.shift_remove(&id) {
            Some(row) => {
                row.handle.cancel();
                debug!(job = %id, "Cancelled job from the jobs window");
                true
            }
            None => false,
        }
    }

    /// "Clear all": cancel every visible job. Returns how many were cancelled.
    pub fn clear_all(&mut self) -> usize {
        let mut cancelled = 0;
        for (_, row) in self.rows.drain(..) {
            row.handle.cancel();
            cancelled += 1;
        }
        cancelled
    }

    pub fn get(&self, id: JobId) -> Option<&JobRow> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn rows(&self) -> impl Iterator<Item = &JobRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
