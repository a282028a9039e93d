//! Background job scheduler.
//!
//! Long-running, cancellable work (downloads, DEM loading, conversions) is
//! submitted to one of several independently sized worker pools. Workers
//! report progress through a [`JobContext`]; every UI-visible effect is sent
//! through a [`UiBridge`] and applied on the UI thread only.

pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod pool;
pub mod scheduler;
pub mod status;
pub mod ui;

pub use config::PoolConfig;
pub use error::JobError;
pub use job::{Cancelled, JobContext, JobHandle, JobId, JobOutcome, JobSpec};
pub use metrics::{JobMetrics, PoolMetrics};
pub use pool::{PoolId, PoolRegistry, PoolTable};
pub use scheduler::Scheduler;
pub use status::{ObserverId, StatusAggregator, StatusObserver, StatusSnapshot};
pub use ui::{ui_channel, JobList, JobRow, UiBridge, UiLoop, UiSender, UiTask};
