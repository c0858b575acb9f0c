//! Reduction
//! ---
//! Applies a list of algorithms to every record of a `Dataset` in one pass.
//! Each partition folds its records into one row of partials (a partial per
//! algorithm, in algorithm order), rows are merged pairwise across
//! partitions, and the final row is handed to each algorithm's `finish`.
//!
//! ```rust
//! use optifold::scheduler::GreedyScheduler;
//! use optifold::BoxError;
//! use optifold_analysis::algorithm::{boxed, Algorithm};
//! use optifold_analysis::dataset::Dataset;
//! use optifold_analysis::reduce::reduce;
//!
//! struct Chars;
//!
//! impl Algorithm<String> for Chars {
//!     type Partial = usize;
//!     type Output = usize;
//!
//!     fn apply(&self, record: &String) -> Result<usize, BoxError> {
//!         Ok(record.chars().count())
//!     }
//!
//!     fn finish(&self, total: usize) -> Result<usize, BoxError> {
//!         Ok(total)
//!     }
//! }
//!
//! let records = Dataset::from_partitions(vec![
//!     vec!["one".to_owned(), "two".to_owned()],
//!     vec!["three".to_owned()]
//! ]);
//! let outcomes = reduce(&[boxed(Chars)], &records, &GreedyScheduler::new(2)).unwrap();
//! let total: usize = outcomes.into_iter().next().unwrap().downcast().unwrap();
//! assert_eq!(total, 11);
//! ```

use std::any::Any;
use std::sync::Arc;

use log::{debug, trace};

use optifold::deferred::{try_batch_apply, try_tree_reduce};
use optifold::scheduler::Scheduler;

use crate::algorithm::{AlgorithmRef, ErasedPartial, Outcome};
use crate::dataset::{Dataset, Partition};
use crate::error::{Error, Result};

/// One partial per algorithm, in algorithm order
type Row = Vec<ErasedPartial>;

/// Applies every algorithm to every record and finishes each one, returning
/// outputs in the order the algorithms were given.
///
/// An empty algorithm list returns immediately without evaluating `records`.
/// A dataset without any records is `Error::EmptyDataset`.
pub fn reduce<R, S>(algorithms: &[AlgorithmRef<R>], records: &Dataset<R>, scheduler: &S) -> Result<Vec<Outcome>>
    where R: Any + Send + Sync + Clone,
          S: Scheduler + ?Sized
{
    if algorithms.is_empty() {
        return Ok(Vec::new())
    }
    let partials = accumulate(algorithms, records, scheduler)?;
    finish_all(algorithms, partials)
}

/// The map/fold half of `reduce`: returns each algorithm's accumulated
/// partial without finishing it.
pub fn accumulate<R, S>(algorithms: &[AlgorithmRef<R>], records: &Dataset<R>, scheduler: &S) -> Result<Vec<ErasedPartial>>
    where R: Any + Send + Sync + Clone,
          S: Scheduler + ?Sized
{
    if algorithms.is_empty() {
        return Ok(Vec::new())
    }
    let algs: Arc<Vec<AlgorithmRef<R>>> = Arc::new(algorithms.to_vec());

    let fold_algs = algs.clone();
    let folded = try_batch_apply(records.to_defs(), move |idx, part: &Partition<R>| {
        fold_partition(&fold_algs, idx, part)
    });

    let merge_algs = algs.clone();
    let total = try_tree_reduce(&folded, move |l: &Option<Row>, r: &Option<Row>| {
        merge_rows(&merge_algs, l, r)
    }).ok_or(Error::EmptyDataset)?;

    debug!("Reducing {} partitions with {} algorithms ({} graph nodes)",
           records.n_partitions(), algs.len(), total.graph_size());

    let row = total.run(scheduler)?.ok_or(Error::EmptyDataset)?;
    if row.len() != algorithms.len() {
        return Err(Error::Invariant(format!(
            "reduction produced {} partials for {} algorithms", row.len(), algorithms.len())))
    }
    Ok(row)
}

/// Finishes every algorithm with its partial, in order.
pub fn finish_all<R>(algorithms: &[AlgorithmRef<R>], partials: Vec<ErasedPartial>) -> Result<Vec<Outcome>> {
    if partials.len() != algorithms.len() {
        return Err(Error::Invariant(format!(
            "{} partials given to finish {} algorithms", partials.len(), algorithms.len())))
    }
    algorithms.iter().zip(partials).map(|(alg, partial)| {
        debug!("Finishing {}", alg.name());
        alg.finish_any(partial)
    }).collect()
}

// `None` when the partition held no records
fn fold_partition<R>(algorithms: &[AlgorithmRef<R>], idx: usize, part: &Partition<R>) -> Result<Option<Row>> {
    let mut acc: Option<Row> = None;
    part.for_each(|record| {
        let row = algorithms.iter()
            .map(|alg| alg.apply_any(record))
            .collect::<Result<Row>>()?;
        acc = Some(match acc.take() {
            Some(prev) => combine_rows(algorithms, &prev, &row)?,
            None => row
        });
        Ok(())
    })?;
    trace!("Folded partition {} with {} records", idx, part.len());
    Ok(acc)
}

fn merge_rows<R>(algorithms: &[AlgorithmRef<R>], left: &Option<Row>, right: &Option<Row>) -> Result<Option<Row>> {
    match (left, right) {
        (Some(l), Some(r)) => combine_rows(algorithms, l, r).map(Some),
        (Some(row), None) | (None, Some(row)) => Ok(Some(row.clone())),
        (None, None) => Ok(None)
    }
}

// Partials only ever combine with partials of the same algorithm
fn combine_rows<R>(algorithms: &[AlgorithmRef<R>], left: &Row, right: &Row) -> Result<Row> {
    if left.len() != algorithms.len() || right.len() != algorithms.len() {
        return Err(Error::Invariant(format!(
            "cannot combine rows of {} and {} partials for {} algorithms",
            left.len(), right.len(), algorithms.len())))
    }
    algorithms.iter()
        .zip(left.iter().zip(right.iter()))
        .map(|(alg, (l, r))| alg.combine_any(l, r))
        .collect()
}
