//! Job types.
//!
//! - [`JobSpec`]: what a caller submits (title, owned data, work closure,
//!   release functions, item count).
//! - [`JobHandle`]: cheap shared handle used to cancel a job from any thread.
//! - [`JobContext`]: the worker-side view passed into the work closure for
//!   cancellation polling and progress reporting.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::pool::PoolId;
use crate::scheduler::Shared;
use crate::ui::JobList;

/// Identifier of a submitted job, unique for the scheduler's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub(crate) u64);

impl JobId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Signal returned by [`JobContext::poll_cancel`] once the job should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job cancelled")]
pub struct Cancelled;

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Panicked,
}

pub(crate) type WorkFn<T> =
    Box<dyn FnOnce(&mut T, &mut JobContext) -> Result<(), Cancelled> + Send>;
pub(crate) type ReleaseFn<T> = Box<dyn FnOnce(T) + Send>;

/// A job ready to be submitted.
///
/// The job owns `data` until teardown, where exactly one of the destructor
/// (normal completion) or the cancel-cleanup (cancelled) consumes it. When
/// the relevant function is absent the data is simply dropped.
pub struct JobSpec<T> {
    pub(crate) title: String,
    pub(crate) data: T,
    pub(crate) work: WorkFn<T>,
    pub(crate) destructor: Option<ReleaseFn<T>>,
    pub(crate) cancel_cleanup: Option<ReleaseFn<T>>,
    pub(crate) item_count: u32,
}

impl<T: Send + 'static> JobSpec<T> {
    pub fn new<F>(title: impl Into<String>, data: T, work: F) -> Self
    where
        F: FnOnce(&mut T, &mut JobContext) -> Result<(), Cancelled> + Send + 'static,
    {
        Self {
            title: title.into(),
            data,
            work: Box::new(work),
            destructor: None,
            cancel_cleanup: None,
            item_count: 0,
        }
    }

    /// Runs on the data after the work closure returns without being cancelled.
    pub fn with_destructor<F>(mut self, destructor: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.destructor = Some(Box::new(destructor));
        self
    }

    /// Runs on the data instead of the destructor when the job was cancelled.
    pub fn with_cancel_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.cancel_cleanup = Some(Box::new(cleanup));
        self
    }

    /// Number of discrete items this job will report progress for.
    pub fn with_items(mut self, item_count: u32) -> Self {
        self.item_count = item_count;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }
}

struct JobShared {
    id: JobId,
    pool: PoolId,
    title: String,
    /// Set by the cancel path, polled by the worker.
    kill: AtomicBool,
    /// Cleared once the UI row is gone; no further row updates after that.
    attached: AtomicBool,
}

/// Shared handle to a submitted job.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobShared>,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, pool: PoolId, title: String) -> Self {
        Self {
            inner: Arc::new(JobShared {
                id,
                pool,
                title,
                kill: AtomicBool::new(false),
                attached: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn pool(&self) -> PoolId {
        self.inner.pool
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.kill.load(Ordering::Acquire)
    }

    /// Whether the job still has a UI row that may receive updates.
    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    /// Set the kill flag and detach the UI row. Returns `true` only for the
    /// call that actually requested the cancellation.
    pub(crate) fn cancel(&self) -> bool {
        self.detach();
        !self.inner.kill.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` if the row was attached before this call.
    pub(crate) fn detach(&self) -> bool {
        self.inner.attached.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.inner.id)
            .field("pool", &self.inner.pool)
            .field("title", &self.inner.title)
            .field("cancel_requested", &self.is_cancel_requested())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Worker-side view of a running job.
pub struct JobContext {
    pub(crate) handle: JobHandle,
    pub(crate) shared: Arc<Shared>,
    /// Items not yet accounted against the outstanding counter.
    pub(crate) remaining: i64,
    cancelled: bool,
}

impl JobContext {
    pub(crate) fn new(handle: JobHandle, shared: Arc<Shared>, item_count: u32) -> Self {
        Self {
            handle,
            shared,
            remaining: i64::from(item_count),
            cancelled: false,
        }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn remaining_items(&self) -> i64 {
        self.remaining
    }

    /// Whether a cancellation has been observed by this job.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Check whether the job should stop: either the scheduler is shutting
    /// down or someone cancelled this job. Once observed, the cancellation
    /// sticks and the job tears down through its cancel-cleanup.
    pub fn poll_cancel(&mut self) -> Result<(), Cancelled> {
        if self.cancelled {
            return Err(Cancelled);
        }
        if self.shared.stop.load(Ordering::Acquire) || self.handle.is_cancel_requested() {
            debug!(job = %self.handle.id(), "Job observed cancellation");
            self.cancelled = true;
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Report one finished item and the overall `fraction` done.
    ///
    /// Updates the UI row (unless it was already removed) and decrements the
    /// outstanding counter. Returns the same signal as [`poll_cancel`].
    ///
    /// [`poll_cancel`]: JobContext::poll_cancel
    pub fn report_progress(&mut self, fraction: f64) -> Result<(), Cancelled> {
        let signal = self.poll_cancel();

        if self.handle.is_attached() {
            let id = self.handle.id();
            let percent = progress_percent(fraction);
            self.shared
                .bridge
                .run_on_ui_thread(Box::new(move |list: &mut JobList| {
                    list.set_progress(id, percent)
                }));
        }

        // Reports beyond the declared item count are not counted twice.
        if self.remaining > 0 {
            self.remaining -= 1;
            self.shared.status.remove_items(1);
        }

        signal
    }
}

/// Convert a completion fraction into a percentage in `[0, 100]`.
/// The sign is ignored; NaN counts as no progress.
pub fn progress_percent(fraction: f64) -> f64 {
    if fraction.is_nan() {
        return 0.0;
    }
    fraction.abs().min(1.0) * 100.0
}
