//! Job scheduler -- owns the worker pools, runs jobs and tears them down.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, startup, cancellation, shutdown and accessors
//! - `execution`: job submission and the worker-side run/teardown path

mod core;
mod execution;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
pub(crate) use self::core::Shared;
