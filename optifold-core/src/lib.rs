//! optifold-core
//!
//! Lazily evaluated task graphs for map/fold reductions, and the schedulers
//! that execute them.
//!
//! Building graphs
//! ---
//!
//! A `Deferred<A>` names a value that a graph will produce.  Graphs grow from
//! `Deferred::lift`, which wraps a concrete value, through `apply` (one
//! argument) and `join` (two arguments).  `try_apply` and `try_join` accept
//! fallible functions; a failure fails every value downstream of it.
//! `batch_apply` and `tree_reduce` build the wide map and pairwise fold
//! shapes reductions are made of.
//!
//! Running graphs
//! ---
//!
//! Nothing executes until `run` is handed a `Scheduler`.  Linear chains are
//! fused into one unit of work before dispatch.  `SyncScheduler` stays on the
//! calling thread, `LeveledScheduler` runs one dependency level at a time on
//! rayon, `GreedyScheduler` keeps a fixed worker pool busy, and
//! `AdaptiveScheduler` sizes that pool to the graph.  `ExecutionContext`
//! picks one of them from an `ExecutionMode`.
//!
//! Example - Hello World!
//! ---
//! ```rust
//! use optifold::deferred::Deferred;
//! use optifold::scheduler::GreedyScheduler;
//!
//! let hello = Deferred::lift("Hello".to_owned(), None);
//! let world = Deferred::lift("World".to_owned(), None);
//! let world_exclaim = world.apply(|w| format!("{}!", w));
//! let hello_world = hello.join(&world_exclaim, |h, w| format!("{} {}", h, w));
//! assert_eq!(hello_world.run(&GreedyScheduler::new(2)).unwrap(), "Hello World!");
//! ```

#![warn(missing_docs)]

/// Contains Deferred primitive and function definitions
pub mod deferred;

/// Contains Scheduler trait definition and implementations
pub mod scheduler;

/// Execution modes and the scoped context built from them
pub mod context;

/// Errors raised while executing graphs
pub mod error;

/// Graph implementation
pub mod graph;

/// Type-erased task definitions
pub mod task;

pub use crate::context::{ContextConfig, ExecutionContext, ExecutionMode};
pub use crate::deferred::Deferred;
pub use crate::error::{BoxError, ExecError};
pub use crate::scheduler::Scheduler;
