//! Pool registry: the built-in remote/local pools plus pools registered by
//! callers before startup.
//!
//! Registration happens on a [`PoolRegistry`]; [`PoolRegistry::finalize`]
//! consumes it and builds the immutable [`PoolTable`], so a pool can never be
//! registered after the workers exist.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{error, info};

use crate::config::PoolConfig;
use crate::error::JobError;

/// Number of pools that always exist.
const BUILTIN_POOLS: usize = 2;

/// Stable identifier of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PoolId(pub(crate) usize);

impl PoolId {
    /// Network-bound work (tile and DEM downloads).
    pub const REMOTE: PoolId = PoolId(0);
    /// CPU-bound work (DEM file loading, conversions).
    pub const LOCAL: PoolId = PoolId(1);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

type PoolSizer = Box<dyn FnOnce() -> usize + Send>;

struct Registration {
    name: String,
    sizer: PoolSizer,
}

/// Collects pool registrations before startup.
pub struct PoolRegistry {
    registered: Vec<Registration>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
        }
    }

    /// Register an extra pool whose thread count is computed by `sizer` when
    /// the registry is finalized.
    pub fn register_pool<F>(&mut self, name: impl Into<String>, sizer: F) -> PoolId
    where
        F: FnOnce() -> usize + Send + 'static,
    {
        let id = PoolId(BUILTIN_POOLS + self.registered.len());
        let name = name.into();
        info!(pool = %name, %id, "Registered pool");
        self.registered.push(Registration {
            name,
            sizer: Box::new(sizer),
        });
        id
    }

    /// Number of pools that finalize will create.
    pub fn pool_count(&self) -> usize {
        BUILTIN_POOLS + self.registered.len()
    }

    /// Build every pool. The built-in pools take their sizes from `config`;
    /// registered pools call their sizing function (at least one thread).
    pub fn finalize(self, config: &PoolConfig) -> Result<PoolTable, JobError> {
        config.validate()?;

        let mut pools = HashMap::with_capacity(self.pool_count());
        pools.insert(PoolId::REMOTE, Pool::build("remote", config.max_threads)?);
        pools.insert(
            PoolId::LOCAL,
            Pool::build("local", config.resolved_local_threads())?,
        );

        for (offset, registration) in self.registered.into_iter().enumerate() {
            let id = PoolId(BUILTIN_POOLS + offset);
            let threads = (registration.sizer)().max(1);
            pools.insert(id, Pool::build(&registration.name, threads)?);
        }

        Ok(PoolTable { pools })
    }
}

/// A bounded set of worker threads.
pub struct Pool {
    name: String,
    max_threads: usize,
    workers: rayon::ThreadPool,
}

impl Pool {
    fn build(name: &str, max_threads: usize) -> Result<Self, JobError> {
        let thread_prefix = name.to_string();
        let panic_pool = name.to_string();
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads)
            .thread_name(move |i| format!("{}-worker-{}", thread_prefix, i))
            .panic_handler(move |_| {
                error!(pool = %panic_pool, "Worker thread panicked outside a job");
            })
            .build()
            .map_err(|e| JobError::PoolBuild {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        info!(pool = %name, max_threads, "Created worker pool");
        Ok(Self {
            name: name.to_string(),
            max_threads,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Queue `f` on this pool; it runs once a worker is free.
    pub(crate) fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.workers.spawn(f);
    }
}

/// The finalized, immutable set of pools.
#[derive(Default)]
pub struct PoolTable {
    pools: HashMap<PoolId, Pool>,
}

impl PoolTable {
    pub fn get(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(&id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Pool ids in registration order.
    pub fn ids(&self) -> Vec<PoolId> {
        let mut ids: Vec<PoolId> = self.pools.keys().copied().collect();
        ids.sort();
        ids
    }
}
