use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::JobOutcome;

/// Per-pool job counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolMetrics {
    pub submitted: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub panicked: u64,
    /// Running average over every finished job.
    pub avg_duration: Duration,
    pub last_finished: Option<DateTime<Utc>>,
}

impl PoolMetrics {
    pub fn finished(&self) -> u64 {
        self.completed + self.cancelled + self.panicked
    }

    /// Jobs submitted but not yet torn down (queued or running).
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.finished())
    }
}

/// Scheduler operational metrics, keyed by pool name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobMetrics {
    pub pools: BTreeMap<String, PoolMetrics>,
}

impl JobMetrics {
    pub fn record_submitted(&mut self, pool: &str) {
        self.pools.entry(pool.to_string()).or_default().submitted += 1;
    }

    /// Record a job teardown.
    pub fn record_finished(&mut self, pool: &str, outcome: JobOutcome, duration: Duration) {
        let m = self.pools.entry(pool.to_string()).or_default();
        match outcome {
            JobOutcome::Completed => m.completed += 1,
            JobOutcome::Cancelled => m.cancelled += 1,
            JobOutcome::Panicked => m.panicked += 1,
        }
        m.last_finished = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = m.finished();
        m.avg_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = m.avg_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn pool(&self, name: &str) -> Option<&PoolMetrics> {
        self.pools.get(name)
    }

    pub fn total_in_flight(&self) -> u64 {
        self.pools.values().map(PoolMetrics::in_flight).sum()
    }
}
