//! Dataset
//! ---
//! A `Dataset` is the record source a reduction consumes: an ordered set of
//! lazily produced partitions.  Partitions either hold their records in memory
//! or stream them back from a spill file, so a reduction never needs the whole
//! dataset resident at once.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use optifold::deferred::{batch_apply, tree_reduce, try_tree_reduce, Deferred};
use optifold::scheduler::Scheduler;

use crate::error::{Error, Result};
use crate::partitioned::partition;
use crate::store::{SpillFile, SpillWriter};

/// A chunk of records
#[derive(Clone)]
pub enum Partition<R> {
    Memory(Vec<R>),
    Spilled(Arc<SpillFile<R>>)
}

impl <R> Partition<R> {
    pub fn spilled(file: SpillFile<R>) -> Self {
        Partition::Spilled(Arc::new(file))
    }

    pub fn len(&self) -> usize {
        match self {
            Partition::Memory(vs) => vs.len(),
            Partition::Spilled(file) => file.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every record in order.  The first error stops iteration and is
    /// returned, whether it came from `f` or from reading a spill file.
    pub fn for_each<F: FnMut(&R) -> Result<()>>(&self, mut f: F) -> Result<()> {
        match self {
            Partition::Memory(vs) => {
                for v in vs {
                    f(v)?;
                }
                Ok(())
            },
            Partition::Spilled(file) => file.for_each(&mut f)
        }
    }

    pub fn to_vec(&self) -> Result<Vec<R>> where R: Clone {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|r| {
            out.push(r.clone());
            Ok(())
        })?;
        Ok(out)
    }
}

/// Partitioned, lazily evaluated records
#[derive(Clone)]
pub struct Dataset<R> {
    partitions: Vec<Deferred<Partition<R>>>
}

impl <R: Any + Send + Sync + Clone> Dataset<R> {

    /// A single in-memory partition.
    /// ```rust
    ///   use optifold::scheduler::GreedyScheduler;
    ///   use optifold_analysis::dataset::Dataset;
    ///
    ///   let ds = Dataset::from_vec(vec![1, 2, 3usize]);
    ///   assert_eq!(ds.collect(&GreedyScheduler::new(2)).unwrap(), vec![1, 2, 3]);
    /// ```
    pub fn from_vec(vs: Vec<R>) -> Self {
        Dataset { partitions: vec![Deferred::lift(Partition::Memory(vs), None)] }
    }

    /// One in-memory partition per inner vector
    pub fn from_partitions(parts: Vec<Vec<R>>) -> Self {
        Dataset {
            partitions: parts.into_iter()
                .map(|p| Deferred::lift(Partition::Memory(p), None))
                .collect()
        }
    }

    /// Wraps partitions already in the graph, such as ones read lazily from files.
    pub fn from_defs(defs: Vec<Deferred<Partition<R>>>) -> Self {
        Dataset { partitions: defs }
    }

    pub fn to_defs(&self) -> &[Deferred<Partition<R>>] {
        &self.partitions
    }

    pub fn n_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Partitions of `self` followed by those of `other`
    pub fn concat(&self, other: &Dataset<R>) -> Dataset<R> {
        let mut nps = self.partitions.clone();
        nps.extend(other.partitions.iter().cloned());
        Dataset { partitions: nps }
    }

    /// Redistributes records round-robin over `n_chunks` partitions.
    /// ```rust
    ///   use optifold_analysis::dataset::Dataset;
    ///
    ///   let ds = Dataset::from_vec((0..10u32).collect());
    ///   assert_eq!(ds.split(4).n_partitions(), 4);
    /// ```
    pub fn split(&self, n_chunks: usize) -> Dataset<R> {
        Dataset { partitions: partition(&self.partitions, n_chunks, |idx, _r| idx) }
    }

    pub fn map<
        B: Any + Send + Sync + Clone,
        F: 'static + Sync + Send + Clone + Fn(&R) -> B
    >(&self, f: F) -> Dataset<B> {
        self.each_partition(move |part| {
            let mut out = Vec::with_capacity(part.len());
            part.for_each(|r| {
                out.push(f(r));
                Ok(())
            })?;
            Ok(out)
        })
    }

    /// Keeps the records passing `f`
    pub fn filter<F: 'static + Sync + Send + Clone + Fn(&R) -> bool>(&self, f: F) -> Dataset<R> {
        self.each_partition(move |part| {
            let mut out = Vec::new();
            part.for_each(|r| {
                if f(r) {
                    out.push(r.clone());
                }
                Ok(())
            })?;
            Ok(out)
        })
    }

    fn each_partition<
        B: Any + Send + Sync + Clone,
        F: 'static + Sync + Send + Clone + Fn(&Partition<R>) -> Result<Vec<B>>
    >(&self, f: F) -> Dataset<B> {
        let parts = self.partitions.iter().map(|p| {
            let f = f.clone();
            p.try_apply(move |part| f(part).map(Partition::Memory))
        }).collect();
        Dataset { partitions: parts }
    }

    /// Number of records, without materialising them
    pub fn count(&self) -> Deferred<usize> {
        let lens = batch_apply(&self.partitions, |_idx, part| part.len());
        tree_reduce(&lens, |x, y| x + y)
            .unwrap_or_else(|| Deferred::lift(0, None))
    }

    /// Writes every partition to its own file under `dir`.  The files are
    /// removed once the last partition referring to them is dropped.
    pub fn spill(&self, dir: &Path) -> Dataset<R> where R: Serialize + DeserializeOwned {
        let dir = dir.to_path_buf();
        let parts = self.partitions.iter().map(|p| {
            let dir = dir.clone();
            p.try_apply(move |part: &Partition<R>| {
                let mut writer = SpillWriter::create(&dir)?;
                part.for_each(|r| writer.add(r))?;
                Ok::<_, Error>(Partition::spilled(writer.finish()?))
            })
        }).collect();
        Dataset { partitions: parts }
    }

    /// Runs the graph and gathers every record in partition order.
    pub fn collect<S: Scheduler + ?Sized>(&self, s: &S) -> Result<Vec<R>> {
        let vecs: Vec<_> = self.partitions.iter()
            .map(|p| p.try_apply(|part: &Partition<R>| part.to_vec()))
            .collect();
        let all = try_tree_reduce(&vecs, |x: &Vec<R>, y: &Vec<R>| {
            let mut out = x.clone();
            out.extend(y.iter().cloned());
            Ok::<_, Error>(out)
        });
        match all {
            Some(d) => Ok(d.run(s)?),
            None => Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod dataset_test {
    use super::*;
    use optifold::scheduler::{GreedyScheduler, LeveledScheduler, SyncScheduler};

    #[test]
    fn test_map_filter_count() {
        let ds = Dataset::from_partitions(vec![vec![1, 2, 3u32], vec![4, 5], vec![]]);
        let odds = ds.filter(|x| x % 2 == 1).map(|x| x * 10);
        assert_eq!(odds.collect(&LeveledScheduler).unwrap(), vec![10, 30, 50]);
        assert_eq!(ds.count().run(&SyncScheduler).unwrap(), 5);
        assert_eq!(Dataset::<u32>::from_defs(Vec::new()).count().run(&SyncScheduler).unwrap(), 0);
    }

    #[test]
    fn test_concat_and_split() {
        let one = Dataset::from_vec(vec![1, 2, 3usize]);
        let two = Dataset::from_vec(vec![4, 5, 6usize]);
        let cat = one.concat(&two);
        assert_eq!(cat.n_partitions(), 2);
        assert_eq!(cat.collect(&SyncScheduler).unwrap(), vec![1, 2, 3, 4, 5, 6]);

        let mut back = cat.split(4).collect(&GreedyScheduler::new(2)).unwrap();
        back.sort();
        assert_eq!(back, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_spill_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ds = Dataset::from_partitions(vec![
            vec!["a".to_owned(), "b".to_owned()],
            vec!["c".to_owned()]
        ]);
        let spilled = ds.spill(dir.path());
        let upper = spilled.map(|s| s.to_uppercase());
        assert_eq!(upper.collect(&SyncScheduler).unwrap(), vec!["A", "B", "C"]);
        // Spill files only live as long as the run that produced them
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_corrupt_partition_fails_collect() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpillWriter::create(dir.path()).unwrap();
        writer.add(&1u64).unwrap();
        let file = writer.finish().unwrap();
        std::fs::write(file.path(), b"not snappy").unwrap();

        let ds = Dataset::from_defs(vec![Deferred::lift(Partition::spilled(file), None)]);
        assert!(ds.collect(&SyncScheduler).is_err());
    }
}
