//! Graph-level helpers for redistributing partitions.

use std::any::Any;

use optifold::deferred::{try_batch_apply, try_tree_reduce, Deferred};

use crate::dataset::Partition;
use crate::error::Error;

/// Splits every partition into `partitions` buckets, routing each record by
/// `key(position, record) % partitions`.  Returns one group of deferred
/// buckets per output partition.
pub fn split_by_key<
    R: Any + Send + Sync + Clone,
    F: 'static + Sync + Send + Clone + Fn(usize, &R) -> usize
>(
    defs: &[Deferred<Partition<R>>],
    partitions: usize,
    key: F
) -> Vec<Vec<Deferred<Partition<R>>>> {
    let partitions = partitions.max(1);

    let stage1 = try_batch_apply(defs, move |_idx, part: &Partition<R>| {
        let mut buckets: Vec<Vec<R>> = (0..partitions).map(|_| Vec::new()).collect();
        let mut position = 0;
        part.for_each(|r| {
            buckets[key(position, r) % partitions].push(r.clone());
            position += 1;
            Ok(())
        })?;
        Ok::<_, Error>(buckets)
    });

    // Pull each bucket back out of every chunk
    let mut splits = Vec::with_capacity(partitions);
    for idx in 0..partitions {
        let group = stage1.iter()
            .map(|s| s.apply(move |buckets| Partition::Memory(buckets[idx].clone())))
            .collect();
        splits.push(group);
    }
    splits
}

/// Repartitions into at most `partitions` partitions.
pub fn partition<
    R: Any + Send + Sync + Clone,
    F: 'static + Sync + Send + Clone + Fn(usize, &R) -> usize
>(
    defs: &[Deferred<Partition<R>>],
    partitions: usize,
    key: F
) -> Vec<Deferred<Partition<R>>> {
    split_by_key(defs, partitions, key).iter()
        .filter_map(|group| concat(group))
        .collect()
}

/// Concatenates partitions in order into a single in-memory partition.
/// `None` when there is nothing to concatenate.
pub fn concat<R: Any + Send + Sync + Clone>(defs: &[Deferred<Partition<R>>]) -> Option<Deferred<Partition<R>>> {
    try_tree_reduce(defs, |x: &Partition<R>, y: &Partition<R>| {
        let mut out = x.to_vec()?;
        out.extend(y.to_vec()?);
        Ok::<_, Error>(Partition::Memory(out))
    })
}

#[cfg(test)]
mod partitioned_test {
    use super::*;
    use optifold::scheduler::{GreedyScheduler, SyncScheduler};

    fn lifted(parts: Vec<Vec<u32>>) -> Vec<Deferred<Partition<u32>>> {
        parts.into_iter().map(|p| Deferred::lift(Partition::Memory(p), None)).collect()
    }

    #[test]
    fn test_concat_keeps_order() {
        let defs = lifted(vec![vec![1, 2], vec![3], vec![], vec![4, 5]]);
        let all = concat(&defs).unwrap().run(&GreedyScheduler::new(2)).unwrap();
        assert_eq!(all.to_vec().unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(concat::<u32>(&[]).is_none());
    }

    #[test]
    fn test_split_by_key() {
        let defs = lifted(vec![vec![1, 2, 3, 4], vec![5, 6]]);
        let groups = split_by_key(&defs, 2, |_idx, x| *x as usize);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);

        let evens = concat(&groups[0]).unwrap().run(&SyncScheduler).unwrap();
        assert_eq!(evens.to_vec().unwrap(), vec![2, 4, 6]);
        let odds = concat(&groups[1]).unwrap().run(&SyncScheduler).unwrap();
        assert_eq!(odds.to_vec().unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn test_partition_round_robin() {
        let defs = lifted(vec![(0..9).collect()]);
        let parts = partition(&defs, 3, |idx, _| idx);
        let sizes: Vec<usize> = parts.iter()
            .map(|p| p.run(&SyncScheduler).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 3]);
    }
}
