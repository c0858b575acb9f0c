//! optifold-analysis
//! ---
//! Cached map/fold reductions over Monte Carlo event records.
//!
//! What is it?
//! ---
//! An `Algorithm` maps each record to a partial result, partial results are
//! merged with `Combine`, and the accumulated partial is turned into the
//! algorithm's output by `finish`.  Any number of algorithms share one pass over
//! a partitioned `Dataset`, executed on a scheduler from `optifold`.
//!
//! `cached_reduce` additionally stores each algorithm's accumulated partial in
//! a `Cache` under the algorithm's key, so later runs over the same records
//! only compute what is missing.  Every algorithm is still finished exactly
//! once per run, and outputs always come back in the order the algorithms
//! were given.
//!
//! Example - Cached selection tables
//! ---
//! ```rust
//! use optifold::{ContextConfig, ExecutionContext, ExecutionMode};
//! use optifold_analysis::cache::Cache;
//! use optifold_analysis::cached::cached_reduce;
//! use optifold_analysis::dataset::Dataset;
//! use optifold_analysis::event::{Candidate, Category, EventRecord};
//! use optifold_analysis::registry::standard_registry;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut record = EventRecord::new("IBD_0001.root", Category::new("IBD", 1.0, 1.0), 1.0);
//! record.candidates.push(Candidate::new(1).with("closestPMT", 2000.0));
//! let records = Dataset::from_vec(vec![record]);
//!
//! let algorithms = standard_registry().resolve(Some("test,selectiontables"), dir.path()).unwrap();
//! let cache = Cache::new(dir.path().join("cache.db"));
//! let context = ExecutionContext::enter(&ContextConfig::with_mode(ExecutionMode::Single));
//!
//! let outputs = cached_reduce(&algorithms, &records, &cache, &context, false).unwrap();
//! assert_eq!(outputs.len(), 2);
//! assert_eq!(outputs[1].algorithm(), "SelectionTables");
//! assert!(dir.path().join("selectiontables/nominal.txt").exists());
//! ```

/// Algorithm protocol and its type-erased form
pub mod algorithm;

/// Reference algorithms
pub mod algs;

/// Reductions that reuse cached partial results
pub mod cached;

/// Key-value cache of serialized results
pub mod cache;

/// Associative merging of partial results
pub mod combine;

/// Run configuration
pub mod config;

/// Partitioned record source
pub mod dataset;

pub mod error;

/// Event records and their categories
pub mod event;

/// Regularly binned histograms
pub mod hist;

/// Weighted means
pub mod mean;

/// Repartitioning helpers
pub mod partitioned;

/// Single pass map/fold over a dataset
pub mod reduce;

pub mod registry;

/// Cuts and selections expressed as data
pub mod selection;

/// Selection efficiency statistics
pub mod stats;

/// Spill files for partitions kept on disk
pub mod store;

/// Standard variables
pub mod variable;

pub use crate::algorithm::{boxed, Algorithm, AlgorithmRef, Outcome};
pub use crate::cache::Cache;
pub use crate::cached::cached_reduce;
pub use crate::combine::Combine;
pub use crate::dataset::Dataset;
pub use crate::error::{Error, Result};
pub use crate::reduce::reduce;
