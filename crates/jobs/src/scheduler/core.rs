use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info};

use crate::job::{JobHandle, JobId};
use crate::metrics::JobMetrics;
use crate::pool::{PoolId, PoolTable};
use crate::status::{ObserverId, StatusAggregator, StatusObserver, StatusSnapshot};
use crate::ui::{JobList, UiBridge};

/// State shared between the scheduler and every running job.
pub(crate) struct Shared {
    pub(crate) bridge: Arc<dyn UiBridge>,
    pub(crate) status: Arc<StatusAggregator>,
    /// Jobs submitted and not yet torn down.
    pub(crate) active: Mutex<HashMap<JobId, JobHandle>>,
    pub(crate) metrics: RwLock<JobMetrics>,
    /// Process-wide stop flag, observed by every job's next poll.
    pub(crate) stop: AtomicBool,
}

impl Shared {
    pub(crate) fn active(&self) -> MutexGuard<'_, HashMap<JobId, JobHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The background job scheduler. Built once from a finalized [`PoolTable`]
/// and torn down once by [`Scheduler::shutdown`].
pub struct Scheduler {
    pub(super) pools: RwLock<PoolTable>,
    pub(super) shared: Arc<Shared>,
    pub(super) next_id: AtomicU64,
}

impl Scheduler {
    /// Start the scheduler on the given pools. All UI effects go through `bridge`.
    pub fn start(pools: PoolTable, bridge: impl UiBridge + 'static) -> Self {
        let bridge: Arc<dyn UiBridge> = Arc::new(bridge);
        info!("Scheduler starting with {} pools", pools.len());
        Self {
            pools: RwLock::new(pools),
            shared: Arc::new(Shared {
                status: StatusAggregator::new(Arc::clone(&bridge)),
                bridge,
                active: Mutex::new(HashMap::new()),
                metrics: RwLock::new(JobMetrics::default()),
                stop: AtomicBool::new(false),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Cancel one job: set its kill flag, detach its UI row and ask the UI
    /// to drop the row. Returns `false` if the job was already cancelled.
    ///
    /// The worker notices on its next poll; nothing here waits for it.
    pub fn request_cancel(&self, handle: &JobHandle) -> bool {
        if !handle.cancel() {
            return false;
        }
        let id = handle.id();
        debug!(job = %id, "Cancellation requested");
        self.shared
            .bridge
            .run_on_ui_thread(Box::new(move |list: &mut JobList| {
                list.remove(id);
            }));
        true
    }

    /// Cancel every job that has not finished yet. Returns how many were
    /// newly cancelled.
    pub fn request_cancel_all(&self) -> usize {
        let handles: Vec<JobHandle> = self.shared.active().values().cloned().collect();
        let cancelled = handles.iter().filter(|h| self.request_cancel(h)).count();
        info!(cancelled, "Cancelled all background jobs");
        cancelled
    }

    /// Stop everything now: raise the stop flag and drop every pool without
    /// waiting for queued or running jobs. Jobs that poll will stop on their
    /// next check; jobs that never poll may keep running in the background.
    pub fn shutdown(&self) {
        if self.shared.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        let pools = std::mem::take(
            &mut *self.pools.write().unwrap_or_else(PoisonError::into_inner),
        );
        let dropped = pools.len();
        drop(pools);

        self.shared
            .bridge
            .run_on_ui_thread(Box::new(|list: &mut JobList| list.clear()));
        info!(
            pools = dropped,
            abandoned = self.shared.active().len(),
            "Scheduler shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Number of live pools (0 after shutdown).
    pub fn pool_count(&self) -> usize {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Thread bound of a pool, if it exists.
    pub fn pool_threads(&self, id: PoolId) -> Option<usize> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|pool| pool.max_threads())
    }

    pub fn pool_name(&self, id: PoolId) -> Option<String> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|pool| pool.name().to_string())
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids()
    }

    /// Jobs submitted and not yet torn down.
    pub fn active_jobs(&self) -> usize {
        self.shared.active().len()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.snapshot()
    }

    pub fn status_aggregator(&self) -> &Arc<StatusAggregator> {
        &self.shared.status
    }

    /// Register a UI window for aggregate status updates.
    pub fn register_observer(&self, observer: Arc<dyn StatusObserver>) -> ObserverId {
        self.shared.status.register_observer(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.shared.status.unregister_observer(id)
    }

    /// Get a snapshot of the current job metrics.
    pub fn metrics(&self) -> JobMetrics {
        self.shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
