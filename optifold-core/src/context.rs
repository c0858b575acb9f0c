use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::ExecError;
use crate::graph::{Graph, Handle};
use crate::scheduler::{AdaptiveScheduler, GreedyScheduler, Scheduler, SyncScheduler};
use crate::task::BASS;

/// Where reductions run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Every task on the calling thread
    Single,

    /// A worker pool sized to this machine
    Local,

    /// A pool that scales with the graph between configured bounds
    Cluster
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Local
    }
}

impl FromStr for ExecutionMode {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(ExecutionMode::Single),
            "local" => Ok(ExecutionMode::Local),
            "cluster" => Ok(ExecutionMode::Cluster),
            _ => Err(ExecError::UnknownMode(s.to_owned()))
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ExecutionMode::Single => "single",
            ExecutionMode::Local => "local",
            ExecutionMode::Cluster => "cluster"
        };
        f.write_str(name)
    }
}

/// Batch queue settings used when running in `cluster` mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Comma separated partitions to submit to
    pub queue: String,
    /// Account jobs are charged to
    pub account: String,
    /// Memory requested per job
    pub memory: String,
    /// Time limit per job, as `HH:MM:SS`
    pub walltime: String,
    /// Fewest workers kept alive
    pub minimum_jobs: usize,
    /// Most workers ever requested
    pub maximum_jobs: usize
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            queue: "epp,taskfarm".into(),
            account: "epp".into(),
            memory: "4GB".into(),
            walltime: "24:00:00".into(),
            minimum_jobs: 1,
            maximum_jobs: 200
        }
    }
}

/// Default memory budget per local worker, in bytes
pub const DEFAULT_WORKER_MEMORY: u64 = 4_000_000_000;

/// Settings used to build an `ExecutionContext`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Backend to build
    pub mode: ExecutionMode,
    /// Memory budget of one local worker, in bytes
    pub worker_memory: u64,
    /// Used in `cluster` mode only
    pub cluster: ClusterConfig
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            mode: ExecutionMode::default(),
            worker_memory: DEFAULT_WORKER_MEMORY,
            cluster: ClusterConfig::default()
        }
    }
}

impl ContextConfig {
    /// Default settings for the given mode
    pub fn with_mode(mode: ExecutionMode) -> Self {
        ContextConfig { mode: mode, ..ContextConfig::default() }
    }
}

/// Number of local workers: one per `worker_memory` of available memory,
/// never more than the CPU count and never fewer than one.
///
/// ```rust
/// use optifold::context::local_worker_count;
///
/// assert_eq!(local_worker_count(Some(16_000_000_000), 4_000_000_000, 8), 4);
/// assert_eq!(local_worker_count(Some(1_000), 4_000_000_000, 8), 1);
/// assert_eq!(local_worker_count(None, 4_000_000_000, 8), 8);
/// ```
pub fn local_worker_count(available_memory: Option<u64>, worker_memory: u64, cpus: usize) -> usize {
    let by_memory = match available_memory {
        Some(m) if worker_memory > 0 => (m / worker_memory) as usize,
        _ => cpus
    };
    by_memory.min(cpus).max(1)
}

/// Memory the OS reports as available, in bytes.  `None` where the
/// platform doesn't report it.
pub fn available_memory() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    Some(sys.available_memory()).filter(|m| *m > 0)
}

enum Backend {
    Single(SyncScheduler),
    Local(GreedyScheduler),
    Cluster(AdaptiveScheduler)
}

/// Scoped execution resource chosen from a `ContextConfig`.  Reductions are
/// handed the context as their scheduler; dropping it tears the backend down.
///
/// ```rust
/// use optifold::context::{ContextConfig, ExecutionContext, ExecutionMode};
/// use optifold::deferred::Deferred;
///
/// let ctx = ExecutionContext::enter(&ContextConfig::with_mode(ExecutionMode::Single));
/// let x = Deferred::lift(20usize, None).apply(|x| x + 22);
/// assert_eq!(x.run(&ctx).unwrap(), 42);
/// ```
pub struct ExecutionContext {
    mode: ExecutionMode,
    backend: Backend
}

impl ExecutionContext {

    /// Builds the backend for the configured mode.
    pub fn enter(config: &ContextConfig) -> Self {
        let backend = match config.mode {
            ExecutionMode::Single => Backend::Single(SyncScheduler),
            ExecutionMode::Local => {
                let memory = available_memory();
                let workers = local_worker_count(memory, config.worker_memory, num_cpus::get());
                debug!("Available memory: {:?}, workers: {}", memory, workers);
                Backend::Local(GreedyScheduler::new(workers))
            },
            ExecutionMode::Cluster => Backend::Cluster(AdaptiveScheduler::new(
                config.cluster.minimum_jobs,
                config.cluster.maximum_jobs
            ))
        };
        let ctx = ExecutionContext { mode: config.mode, backend: backend };
        info!("Entered {} execution context ({})", ctx.mode, ctx.describe());
        ctx
    }

    /// Mode this context was built for
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Short description of the backend's worker arrangement
    pub fn describe(&self) -> String {
        match &self.backend {
            Backend::Single(_) => "calling thread".into(),
            Backend::Local(s) => format!("{} workers", s.threads()),
            Backend::Cluster(s) => {
                let (min, max) = s.range();
                format!("{} to {} workers", min, max)
            }
        }
    }
}

impl Scheduler for ExecutionContext {
    fn compute(&self, graph: Arc<Graph>, outputs: &[Arc<Handle>]) -> Result<Vec<Arc<BASS>>, ExecError> {
        match &self.backend {
            Backend::Single(s) => s.compute(graph, outputs),
            Backend::Local(s) => s.compute(graph, outputs),
            Backend::Cluster(s) => s.compute(graph, outputs)
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        info!("Leaving {} execution context", self.mode);
    }
}

#[cfg(test)]
mod context_test {
    use super::*;
    use crate::deferred::{tree_reduce, Deferred};

    #[test]
    fn test_mode_parsing() {
        assert_eq!("single".parse::<ExecutionMode>().unwrap(), ExecutionMode::Single);
        assert_eq!(" Local ".parse::<ExecutionMode>().unwrap(), ExecutionMode::Local);
        assert_eq!("cluster".parse::<ExecutionMode>().unwrap(), ExecutionMode::Cluster);
        match "grid".parse::<ExecutionMode>() {
            Err(ExecError::UnknownMode(m)) => assert_eq!(m, "grid"),
            other => panic!("unexpected: {:?}", other)
        }
        assert_eq!(ExecutionMode::Cluster.to_string(), "cluster");
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(local_worker_count(Some(0), 4, 8), 1);
        assert_eq!(local_worker_count(Some(100), 4, 8), 8);
        assert_eq!(local_worker_count(Some(100), 0, 3), 3);
        assert_eq!(local_worker_count(None, 4, 0), 1);
    }

    #[test]
    fn test_available_memory_sizes_local_pool() {
        let memory = available_memory();
        assert!(memory.map_or(false, |m| m > 0));
        let workers = local_worker_count(memory, 1, num_cpus::get());
        assert_eq!(workers, num_cpus::get().max(1));
    }

    #[test]
    fn test_every_mode_runs_graphs() {
        let parts: Vec<_> = (1..=10usize).map(|x| Deferred::lift(x, None)).collect();
        let total = tree_reduce(&parts, |a, b| a + b).unwrap();
        for mode in vec![ExecutionMode::Single, ExecutionMode::Local, ExecutionMode::Cluster] {
            let mut config = ContextConfig::with_mode(mode);
            config.cluster.maximum_jobs = 4;
            let ctx = ExecutionContext::enter(&config);
            assert_eq!(ctx.mode(), mode);
            assert_eq!(total.run(&ctx).unwrap(), 55);
        }
    }
}
