//! Scheduler error types.
//!
//! Only configuration-class failures live here. Cancellation is a normal
//! terminal state (see [`crate::job::Cancelled`]) and failures inside a
//! work closure never reach the scheduler.

use thiserror::Error;

use crate::pool::PoolId;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown pool: {0}")]
    UnknownPool(PoolId),

    #[error("failed to build pool '{name}': {reason}")]
    PoolBuild { name: String, reason: String },

    #[error("scheduler has been shut down")]
    ShutDown,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
