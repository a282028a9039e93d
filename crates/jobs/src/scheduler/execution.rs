use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::error::JobError;
use crate::job::{JobContext, JobHandle, JobId, JobOutcome, JobSpec};
use crate::pool::PoolId;
use crate::ui::JobList;

use super::Scheduler;

impl Scheduler {
    /// Submit a job to a pool.
    ///
    /// Adds the job's items to the outstanding counter, queues creation of
    /// its UI row and then hands it to the pool, so the row request always
    /// precedes any progress update from the worker.
    pub fn submit<T: Send + 'static>(
        &self,
        pool_id: PoolId,
        spec: JobSpec<T>,
    ) -> Result<JobHandle, JobError> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        if self.is_shut_down() {
            return Err(JobError::ShutDown);
        }
        let pool = pools.get(pool_id).ok_or(JobError::UnknownPool(pool_id))?;

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = JobHandle::new(id, pool_id, spec.title.clone());
        let pool_name = pool.name().to_string();

        self.shared.status.add_items(i64::from(spec.item_count));

        let row = handle.clone();
        self.shared
            .bridge
            .run_on_ui_thread(Box::new(move |list: &mut JobList| list.insert(row)));

        self.shared.active().insert(id, handle.clone());
        if let Ok(mut m) = self.shared.metrics.write() {
            m.record_submitted(&pool_name);
        }

        debug!(
            job = %id,
            pool = %pool_name,
            title = %spec.title,
            items = spec.item_count,
            "Submitted job"
        );

        let ctx = JobContext::new(handle.clone(), Arc::clone(&self.shared), spec.item_count);
        pool.spawn(move || run_job(spec, ctx, pool_name));
        Ok(handle)
    }
}

/// Worker-side body: run the work closure, then tear the job down exactly once.
fn run_job<T: Send + 'static>(spec: JobSpec<T>, mut ctx: JobContext, pool_name: String) {
    let JobSpec {
        title,
        mut data,
        work,
        destructor,
        cancel_cleanup,
        ..
    } = spec;
    let id = ctx.handle().id();
    let started = Instant::now();
    debug!(job = %id, pool = %pool_name, "Job started");

    let result = panic::catch_unwind(AssertUnwindSafe(|| work(&mut data, &mut ctx)));
    let outcome = match result {
        Ok(Ok(())) if !ctx.is_cancelled() => JobOutcome::Completed,
        Ok(_) => JobOutcome::Cancelled,
        Err(payload) if ctx.is_cancelled() => {
            warn!(job = %id, title = %title, "Job panicked after cancellation: {}", panic_message(&*payload));
            JobOutcome::Cancelled
        }
        Err(payload) => {
            error!(job = %id, title = %title, "Job panicked: {}", panic_message(&*payload));
            JobOutcome::Panicked
        }
    };

    // Exactly one release path consumes the data.
    let release = match outcome {
        JobOutcome::Cancelled => cancel_cleanup,
        JobOutcome::Completed | JobOutcome::Panicked => destructor,
    };
    if let Some(release) = release {
        if panic::catch_unwind(AssertUnwindSafe(move || release(data))).is_err() {
            error!(job = %id, title = %title, "Releasing job data panicked");
        }
    }

    teardown(ctx, outcome, started, &pool_name);
}

fn teardown(mut ctx: JobContext, outcome: JobOutcome, started: Instant, pool_name: &str) {
    let id = ctx.handle.id();

    let leftover = std::mem::take(&mut ctx.remaining);
    ctx.shared.status.remove_items(leftover);

    // A cancelled job's row was already removed by the cancel path.
    if ctx.handle.detach() {
        ctx.shared
            .bridge
            .run_on_ui_thread(Box::new(move |list: &mut JobList| {
                list.remove(id);
            }));
    }

    ctx.shared.active().remove(&id);
    let elapsed = started.elapsed();
    if let Ok(mut m) = ctx.shared.metrics.write() {
        m.record_finished(pool_name, outcome, elapsed);
    }
    debug!(job = %id, ?outcome, ?elapsed, "Job finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
