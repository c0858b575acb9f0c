//! Cached reduction
//! ---
//! `cached_reduce` consults the cache for every algorithm with a key, runs the
//! map/fold pass only for the algorithms it could not find, stores their fresh
//! partials, and finishes every algorithm exactly once in the order given.

use std::any::Any;

use log::{debug, error, info, warn};

use optifold::scheduler::Scheduler;

use crate::algorithm::{AlgorithmRef, ErasedPartial, Outcome};
use crate::cache::{Cache, CacheSession};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::reduce::{accumulate, finish_all};

/// Like `reduce`, reusing accumulated partials stored in `cache`.
///
/// Lookups are skipped for algorithms without a key and for everything when
/// `force` is set.  An unreadable entry is logged and recomputed.  A failed
/// cache write is returned as the error after every other key has been
/// written.  Nothing is written unless the map/fold pass completes.
///
/// ```rust
/// use optifold::scheduler::SyncScheduler;
/// use optifold::BoxError;
/// use optifold_analysis::algorithm::{boxed, Algorithm};
/// use optifold_analysis::cache::Cache;
/// use optifold_analysis::cached::cached_reduce;
/// use optifold_analysis::dataset::Dataset;
///
/// struct Count;
///
/// impl Algorithm<u32> for Count {
///     type Partial = u64;
///     type Output = u64;
///
///     fn key(&self) -> Option<String> {
///         Some("Count".into())
///     }
///
///     fn apply(&self, _record: &u32) -> Result<u64, BoxError> {
///         Ok(1)
///     }
///
///     fn finish(&self, n: u64) -> Result<u64, BoxError> {
///         Ok(n)
///     }
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// let cache = Cache::new(dir.path().join("cache.db"));
/// let records = Dataset::from_vec(vec![1, 2, 3u32]);
///
/// let first = cached_reduce(&[boxed(Count)], &records, &cache, &SyncScheduler, false).unwrap();
/// assert_eq!(first.into_iter().next().unwrap().downcast::<u64>().unwrap(), 3);
/// let stored: u64 = cache.get("Count").unwrap();
/// assert_eq!(stored, 3);
/// ```
pub fn cached_reduce<R, S>(
    algorithms: &[AlgorithmRef<R>],
    records: &Dataset<R>,
    cache: &Cache,
    scheduler: &S,
    force: bool
) -> Result<Vec<Outcome>>
    where R: Any + Send + Sync + Clone,
          S: Scheduler + ?Sized
{
    if algorithms.is_empty() {
        return Ok(Vec::new())
    }

    let session = cache.begin()?;
    let partials = accumulate_cached(algorithms, records, &session, scheduler, force);
    let closed = session.end();
    let partials = partials?;
    closed?;

    finish_all(algorithms, partials)
}

fn accumulate_cached<R, S>(
    algorithms: &[AlgorithmRef<R>],
    records: &Dataset<R>,
    session: &CacheSession,
    scheduler: &S,
    force: bool
) -> Result<Vec<ErasedPartial>>
    where R: Any + Send + Sync + Clone,
          S: Scheduler + ?Sized
{
    let mut slots: Vec<Option<ErasedPartial>> = vec![None; algorithms.len()];
    let mut pending = Vec::new();

    for (idx, alg) in algorithms.iter().enumerate() {
        match alg.key() {
            Some(key) if !force => match lookup(alg, &key, session) {
                Some(partial) => slots[idx] = Some(partial),
                None => pending.push(idx)
            },
            _ => pending.push(idx)
        }
    }

    info!("{} of {} algorithms cached; computing {}",
          algorithms.len() - pending.len(), algorithms.len(), pending.len());

    if !pending.is_empty() {
        let subset: Vec<AlgorithmRef<R>> = pending.iter().map(|&idx| algorithms[idx].clone()).collect();
        let computed = accumulate(&subset, records, scheduler)?;

        let mut write_error = None;
        for (&idx, partial) in pending.iter().zip(computed) {
            let alg = &algorithms[idx];
            if let Some(key) = alg.key() {
                if let Err(e) = store(alg, &key, &partial, session) {
                    error!("Failed to cache {} under {}: {}", alg.name(), key, e);
                    if write_error.is_none() {
                        write_error = Some(e);
                    }
                }
            }
            slots[idx] = Some(partial);
        }
        if let Some(e) = write_error {
            return Err(e)
        }
    }

    slots.into_iter().enumerate()
        .map(|(idx, slot)| slot.ok_or_else(|| Error::Invariant(format!("no partial result for algorithm {}", idx))))
        .collect()
}

// Read failures count as misses
fn lookup<R>(alg: &AlgorithmRef<R>, key: &str, session: &CacheSession) -> Option<ErasedPartial> {
    match session.get_bytes(key).and_then(|bytes| alg.decode(&bytes)) {
        Ok(partial) => {
            debug!("Cache hit for {}: {}", alg.name(), key);
            Some(partial)
        },
        Err(Error::NotFound(_)) => {
            debug!("Cache miss for {}: {}", alg.name(), key);
            None
        },
        Err(e) => {
            warn!("Ignoring unreadable cache entry {} for {}: {}", key, alg.name(), e);
            None
        }
    }
}

fn store<R>(alg: &AlgorithmRef<R>, key: &str, partial: &ErasedPartial, session: &CacheSession) -> Result<()> {
    let bytes = alg.encode(partial)?;
    session.set_bytes(key, &bytes)?;
    debug!("Cached {} under {} ({} bytes)", alg.name(), key, bytes.len());
    Ok(())
}
