use serde::{Deserialize, Serialize};
use waymark_core::BackgroundConfig;

use crate::error::JobError;

/// Thread caps for the two built-in pools, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Worker threads for the remote (network-bound) pool.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Worker threads for the local (CPU-bound) pool. 0 = cpu count - 1.
    #[serde(default = "default_max_threads_local")]
    pub max_threads_local: usize,
}

fn default_max_threads() -> usize { 10 }
fn default_max_threads_local() -> usize { 0 }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            max_threads_local: default_max_threads_local(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), JobError> {
        if self.max_threads == 0 {
            return Err(JobError::InvalidConfig(
                "max_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the local pool size (0 means derive it from the CPU count).
    pub fn resolved_local_threads(&self) -> usize {
        if self.max_threads_local == 0 {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            local_threads_for(cpus)
        } else {
            self.max_threads_local
        }
    }
}

/// Default local pool size: leave one CPU for the UI thread, but never
/// fewer than one worker.
pub fn local_threads_for(cpus: usize) -> usize {
    cpus.saturating_sub(1).max(1)
}

impl From<&BackgroundConfig> for PoolConfig {
    fn from(background: &BackgroundConfig) -> Self {
        Self {
            max_threads: background.max_threads.unwrap_or_else(default_max_threads),
            max_threads_local: background
                .max_threads_local
                .unwrap_or_else(default_max_threads_local),
        }
    }
}
