use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};

use jobpool::JobPool;
use log::Level::{Debug as LDebug, Trace};
use log::{debug, log_enabled, trace};
use priority_queue::PriorityQueue;
use rayon::prelude::*;

use crate::error::ExecError;
use crate::graph::{FnArgs, Graph, Handle, Task};
use crate::task::{DynArgs, EvalError, BASS};

type DepGraph = HashMap<Arc<Handle>, HashSet<Arc<Handle>>>;
type Chain = Vec<Arc<Handle>>;
type ChainGraph = HashMap<Chain, HashSet<Arc<Handle>>>;
type Store = Mutex<DataStore<Arc<Handle>, Arc<BASS>>>;

/// Executes a graph, producing the values of the requested handles in order.
pub trait Scheduler {
    /// Runs whatever part of `graph` the outputs depend on.  Fails with the
    /// first error any task reports.
    fn compute(&self, graph: Arc<Graph>, outputs: &[Arc<Handle>]) -> Result<Vec<Arc<BASS>>, ExecError>;
}

#[derive(Debug)]
struct DataStore<K: PartialEq + Hash + Eq, V> {
    data: HashMap<K, V>,
    counts: HashMap<K, usize>
}

impl <K: PartialEq + Hash + Eq, V: Clone> DataStore<K,V> {
    fn new(counts: HashMap<K, usize>) -> Self {
        DataStore { data: HashMap::new(), counts: counts }
    }

    // Values are dropped once their last reader has taken them
    fn get(&mut self, handle: &K) -> Option<V> {
        let count = self.counts.get_mut(handle).map(|c| {
            *c = c.saturating_sub(1);
            *c
        }).unwrap_or(0);

        if count == 0 {
            self.data.remove(handle)
        } else {
            self.data.get(handle).cloned()
        }
    }

    fn insert(&mut self, handle: K, data: V) {
        self.data.insert(handle, data);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Limbo {
    One(Arc<BASS>),
    Two(Arc<BASS>, Arc<BASS>)
}

fn get_fnargs(ds: &mut DataStore<Arc<Handle>,Arc<BASS>>, fa: &FnArgs) -> Result<Limbo, ExecError> {
    let mut take = |h: &Arc<Handle>| ds.get(h)
        .ok_or_else(|| ExecError::MissingOutput(h.to_string()));
    match fa {
        FnArgs::Single(h) => Ok(Limbo::One(take(h)?)),
        FnArgs::Join(l, r) => {
            let left = take(l)?;
            Ok(Limbo::Two(left, take(r)?))
        }
    }
}

// Converts a flattened graph into inbound and outbound dependency lists
fn build_dep_graph(graph: &Graph) -> (DepGraph, DepGraph) {
    let mut inbound: DepGraph = HashMap::new();
    let mut outbound: DepGraph = HashMap::new();
    for (output, inputs) in graph.dependencies.iter() {
        let hs: HashSet<Arc<Handle>> = inputs.iter()
            .flat_map(|fa| fa.handles())
            .cloned()
            .collect();
        for h in hs.iter() {
            outbound.entry(h.clone()).or_insert_with(HashSet::new).insert(output.clone());
        }
        inbound.insert(output.clone(), hs);
    }
    (inbound, outbound)
}

// Finds chains of tasks that can be collapsed into a single unit of work.
// A chain never continues past a node listed in `stops`.
fn collapse_graph<K: Hash + Eq + Debug + Clone>(
    mut nodes: HashMap<K, HashSet<K>>,
    stops: &HashSet<K>
) -> HashMap<Vec<K>, HashSet<K>> {

    let mut outbound: HashMap<K, Vec<K>> = HashMap::new();
    let mut roots = Vec::new();
    let mut inbound: HashMap<K, usize> = HashMap::new();
    for (node, deps) in nodes.iter() {
        outbound.entry(node.clone()).or_insert_with(Vec::new);
        for d in deps.iter() {
            outbound.entry(d.clone()).or_insert_with(Vec::new).push(node.clone());
        }
        if deps.is_empty() {
            roots.push(vec![node.clone()]);
        }
        inbound.insert(node.clone(), deps.len());
    }

    let mut new_nodes = HashMap::new();
    let mut seen = HashSet::new();
    while let Some(mut chain) = roots.pop() {
        let link = {
            let tail = &chain[chain.len() - 1];
            let next = &outbound[tail];
            // Single consumer which reads only from us: part of the same chain
            if !stops.contains(tail) && next.len() == 1 && inbound.get(&next[0]) == Some(&1) {
                Some(next[0].clone())
            } else {
                None
            }
        };

        match link {
            Some(node) => {
                chain.push(node);
                roots.push(chain);
            },
            None => {
                for node in outbound[&chain[chain.len() - 1]].iter() {
                    if seen.insert(node.clone()) {
                        roots.push(vec![node.clone()]);
                    }
                }
                let deps = nodes.remove(&chain[0]).unwrap_or_default();
                new_nodes.insert(chain, deps);
            }
        }
    }

    new_nodes
}

// Groups chains into levels with no dependencies between members of a level
fn generate_levels(collapsed: &ChainGraph) -> Vec<Vec<Chain>> {
    let mut outbound: HashMap<&Arc<Handle>, Vec<&Chain>> = HashMap::new();
    for (chain, deps) in collapsed.iter() {
        for d in deps.iter() {
            outbound.entry(d).or_insert_with(Vec::new).push(chain);
        }
    }
    let mut remaining: HashMap<&Chain, usize> = collapsed.iter()
        .map(|(chain, deps)| (chain, deps.len()))
        .collect();

    let mut levels: Vec<Vec<Chain>> = Vec::new();
    let mut cur_level: Vec<&Chain> = remaining.iter()
        .filter(|(_, n)| **n == 0)
        .map(|(chain, _)| *chain)
        .collect();

    while !cur_level.is_empty() {
        for chain in cur_level.iter() {
            remaining.remove(*chain);
        }

        let mut next_level = Vec::new();
        for chain in cur_level.iter() {
            let last = &chain[chain.len() - 1];
            for node in outbound.get(last).into_iter().flatten() {
                if let Some(n) = remaining.get_mut(*node) {
                    *n -= 1;
                    if *n == 0 {
                        next_level.push(*node);
                    }
                }
            }
        }

        levels.push(cur_level.into_iter().cloned().collect());
        cur_level = next_level;
    }
    if log_enabled!(LDebug) {
        let mut max_con = 0usize;
        for (i, l) in levels.iter().enumerate() {
            max_con = max_con.max(l.len());
            debug!("Level: {}, Tasks: {}", i, l.len());
        }
        debug!("Max Concurrency: {}", max_con);
    }
    levels
}

// Collapses the graph and sizes the data store so requested outputs survive
// until they are returned
fn prepare(graph: &Graph, outputs: &[Arc<Handle>]) -> (ChainGraph, DepGraph, Store) {
    debug!("Number of Tasks Specified: {}", graph.tasks.len());

    let (inbound, outbound) = build_dep_graph(graph);
    let stops: HashSet<Arc<Handle>> = outputs.iter().cloned().collect();
    let collapsed = collapse_graph(inbound, &stops);

    debug!("Number of Tasks to Run: {}", collapsed.len());

    let mut counts: HashMap<Arc<Handle>, usize> = HashMap::new();
    for fa in graph.dependencies.values().flatten() {
        for h in fa.handles() {
            *counts.entry(h.clone()).or_insert(0) += 1;
        }
    }
    for h in outputs {
        *counts.entry(h.clone()).or_insert(0) += 1;
    }

    (collapsed, outbound, Mutex::new(DataStore::new(counts)))
}

fn eval_task(task: &Task, args: Option<&Limbo>, handle: &Arc<Handle>) -> Result<BASS, ExecError> {
    let out = match (task, args) {
        (Task::Input(input), _) => return Ok(input.read()),
        (Task::Function(t), Some(Limbo::One(a))) => t.eval(DynArgs::One(a)),
        (Task::Function(t), Some(Limbo::Two(a, b))) => t.eval(DynArgs::Two(a, b)),
        (Task::Function(_), None) => return Err(ExecError::MissingOutput(handle.to_string()))
    };
    out.map_err(|e| match e {
        EvalError::Mismatch => ExecError::TypeMismatch(handle.to_string()),
        EvalError::Failed(source) => ExecError::Task { task: handle.name().to_owned(), source: source }
    })
}

fn run_task(graph: &Graph, chain: &[Arc<Handle>], ds: &Store) -> Result<(), ExecError> {
    trace!("Reading dependencies for chain {:?}", chain[0]);
    let mut largs = match graph.dependencies.get(&chain[0]) {
        Some(Some(fa)) => Some(get_fnargs(&mut lock(ds), fa)?),
        _ => None
    };

    for (i, handle) in chain.iter().enumerate() {
        trace!("Processing handle: {:?}", handle);
        if i > 0 {
            // Inside a chain every argument is the previous link's output
            let prev = match largs.take() {
                Some(Limbo::One(p)) => p,
                _ => return Err(ExecError::MissingOutput(chain[i - 1].to_string()))
            };
            largs = match graph.dependencies.get(handle) {
                Some(Some(fa)) => match &**fa {
                    FnArgs::Single(_) => Some(Limbo::One(prev)),
                    FnArgs::Join(_, _) => Some(Limbo::Two(prev.clone(), prev))
                },
                _ => None
            };
        }
        let task = graph.tasks.get(handle)
            .ok_or_else(|| ExecError::MissingOutput(handle.to_string()))?;
        let out = eval_task(task, largs.as_ref(), handle)?;
        largs = Some(Limbo::One(Arc::new(out)));
    }

    if let Some(Limbo::One(d)) = largs {
        lock(ds).insert(chain[chain.len() - 1].clone(), d);
    }
    Ok(())
}

fn collect_outputs(ds: &Store, outputs: &[Arc<Handle>]) -> Result<Vec<Arc<BASS>>, ExecError> {
    let mut store = lock(ds);
    outputs.iter()
        .map(|h| store.get(h).ok_or_else(|| ExecError::MissingOutput(h.to_string())))
        .collect()
}

/// Widest level of the collapsed graph: the most units of work that can run at once.
pub fn peak_concurrency(graph: &Graph, outputs: &[Arc<Handle>]) -> usize {
    let (collapsed, _, _) = prepare(graph, outputs);
    generate_levels(&collapsed).iter().map(|l| l.len()).max().unwrap_or(0)
}

/// Runs every task on the calling thread, one level at a time.
pub struct SyncScheduler;

impl Scheduler for SyncScheduler {

    fn compute(
        &self,
        graph: Arc<Graph>,
        outputs: &[Arc<Handle>]
    ) -> Result<Vec<Arc<BASS>>, ExecError> {
        let (collapsed, _, dsam) = prepare(&graph, outputs);
        for (i, level) in generate_levels(&collapsed).into_iter().enumerate() {
            debug!("Running level: {}", i);
            for chain in level.iter() {
                run_task(&graph, chain, &dsam)?;
            }
        }
        debug!("Finished");
        collect_outputs(&dsam, outputs)
    }
}

/// Runs each level in parallel on the rayon pool.
pub struct LeveledScheduler;

impl Scheduler for LeveledScheduler {

    fn compute(
        &self,
        graph: Arc<Graph>,
        outputs: &[Arc<Handle>]
    ) -> Result<Vec<Arc<BASS>>, ExecError> {
        let (collapsed, _, dsam) = prepare(&graph, outputs);
        for (i, level) in generate_levels(&collapsed).into_iter().enumerate() {
            debug!("Running level: {}", i);
            level.par_iter().try_for_each(|chain| run_task(&graph, chain, &dsam))?;
        }
        debug!("Finished");
        collect_outputs(&dsam, outputs)
    }
}

/// Dispatches ready chains to a fixed pool of threads as soon as their inputs exist.
pub struct GreedyScheduler(usize);

impl GreedyScheduler {
    /// Pool of `n_threads` workers, at least one
    pub fn new(n_threads: usize) -> Self { GreedyScheduler(n_threads.max(1)) }

    /// Number of worker threads
    pub fn threads(&self) -> usize { self.0 }
}

impl Scheduler for GreedyScheduler {

    fn compute(
        &self,
        graph: Arc<Graph>,
        outputs: &[Arc<Handle>]
    ) -> Result<Vec<Arc<BASS>>, ExecError> {
        let (collapsed, mut outbound, store) = prepare(&graph, outputs);
        let dsam = Arc::new(store);

        let mut queue = PriorityQueue::new();
        for (chain, deps) in collapsed.iter() {
            if deps.is_empty() {
                queue.push(chain.clone(), 0usize);
            }
        }

        let mut head_map: HashMap<_,_> = collapsed.into_iter().map(|(chain, deps)| {
            (chain[0].clone(), (chain, deps.len(), deps))
        }).collect();

        trace!("Output: {:?}", outputs);
        if log_enabled!(Trace) {
            for (index, (chain, _priority, deps)) in head_map.iter() {
                trace!("Index: {:?}, Chain: {:?}, Deps: {:?}", index, chain, deps);
            }
        }

        let mut failure = None;
        {
            let mut pool = JobPool::new(self.0);
            let mut free_threads = self.0;
            let (tx, rx) = mpsc::channel();
            loop {
                while failure.is_none() && free_threads > 0 {
                    let chain: Chain = match queue.pop() {
                        Some((chain, _priority)) => chain,
                        None => break
                    };
                    trace!("Queueing chain: {:?}", chain);
                    let g = graph.clone();
                    let d = dsam.clone();
                    let thread_tx = tx.clone();
                    pool.queue(move || {
                        let tail = chain[chain.len() - 1].clone();
                        let res = panic::catch_unwind(AssertUnwindSafe(|| run_task(&g, &chain, &d)))
                            .unwrap_or_else(|_| Err(ExecError::Panicked(tail.to_string())));
                        // The receiver only hangs up once the scheduler has returned
                        let _ = thread_tx.send((tail, res));
                    });
                    free_threads -= 1;
                }

                // Nothing in flight: either done or stopped by a failure
                if free_threads == self.0 {
                    break
                }

                let (handle, res): (Arc<Handle>, Result<(), ExecError>) = match rx.recv() {
                    Ok(msg) => msg,
                    Err(_) => break
                };
                trace!("{:?} finished", handle);
                free_threads += 1;
                if let Err(e) = res {
                    debug!("{} failed, draining in-flight tasks", handle);
                    failure.get_or_insert(e);
                    continue
                }

                if let Some(out) = outbound.remove(&handle) {
                    for out_handle in out {
                        if let Some((chain, p, deps)) = head_map.get_mut(&out_handle) {
                            trace!("Updating {:?}", out_handle);
                            deps.remove(&handle);
                            if deps.is_empty() {
                                trace!("Adding new chain: {:?}", chain);
                                queue.push(chain.clone(), *p);
                            }
                        }
                    }
                }
            }
            pool.shutdown();
        }

        if let Some(e) = failure {
            return Err(e)
        }
        debug!("Finished");
        collect_outputs(&dsam, outputs)
    }
}

/// Sizes a greedy pool per graph: the peak level width, clamped to a worker range.
pub struct AdaptiveScheduler {
    minimum: usize,
    maximum: usize
}

impl AdaptiveScheduler {
    /// Bounds are raised to at least one worker, and `maximum` to at least `minimum`.
    pub fn new(minimum: usize, maximum: usize) -> Self {
        let minimum = minimum.max(1);
        AdaptiveScheduler { minimum: minimum, maximum: maximum.max(minimum) }
    }

    /// Workers that would be used for the given graph
    pub fn workers_for(&self, graph: &Graph, outputs: &[Arc<Handle>]) -> usize {
        peak_concurrency(graph, outputs).max(self.minimum).min(self.maximum)
    }

    /// Inclusive worker range
    pub fn range(&self) -> (usize, usize) {
        (self.minimum, self.maximum)
    }
}

impl Scheduler for AdaptiveScheduler {

    fn compute(
        &self,
        graph: Arc<Graph>,
        outputs: &[Arc<Handle>]
    ) -> Result<Vec<Arc<BASS>>, ExecError> {
        let workers = self.workers_for(&graph, outputs);
        debug!("Adapting to {} workers (range {}..={})", workers, self.minimum, self.maximum);
        GreedyScheduler::new(workers).compute(graph, outputs)
    }
}

#[cfg(test)]
mod size_test {
    use super::*;
    use crate::deferred::{tree_reduce, Deferred};
    use std::thread;

    fn set(items: &[usize]) -> HashSet<usize> {
        items.iter().cloned().collect()
    }

    #[test]
    fn test_graph_collapse() {
        /*
        1 -> 2 -> 3
              \
               4 -> 5

        We should collapse 1 -> 2 and 4 -> 5
        */
        let mut deps = HashMap::new();
        deps.insert(1usize, set(&[]));
        deps.insert(2usize, set(&[1]));
        deps.insert(3usize, set(&[2]));
        deps.insert(4usize, set(&[2]));
        deps.insert(5usize, set(&[4]));

        let out = collapse_graph(deps, &HashSet::new());
        let mut res = HashMap::new();
        res.insert(vec![1, 2], set(&[]));
        res.insert(vec![3], set(&[2]));
        res.insert(vec![4, 5], set(&[2]));

        assert_eq!(out, res);
    }

    #[test]
    fn test_graph_collapse_diamond() {
        /*
             2 -> 4
            /     |
           1 ---> 3

        */
        let mut deps = HashMap::new();
        deps.insert(1usize, set(&[]));
        deps.insert(2usize, set(&[1]));
        deps.insert(3usize, set(&[1]));
        deps.insert(4usize, set(&[2, 3]));

        let res = deps.clone().into_iter().map(|(k, v)| (vec![k], v)).collect();
        let out = collapse_graph(deps, &HashSet::new());

        assert_eq!(out, res);
    }

    #[test]
    fn test_graph_collapse_stops_at_outputs() {
        let mut deps = HashMap::new();
        deps.insert(1usize, set(&[]));
        deps.insert(2usize, set(&[1]));
        deps.insert(3usize, set(&[2]));

        let out = collapse_graph(deps, &set(&[2]));
        let mut res = HashMap::new();
        res.insert(vec![1, 2], set(&[]));
        res.insert(vec![3], set(&[2]));
        assert_eq!(out, res);
    }

    #[test]
    fn test_sync_scheduler_stays_on_caller_thread() {
        let caller = thread::current().id();
        let d = Deferred::lift(1usize, None)
            .apply(move |x| (*x, thread::current().id() == caller));
        let outs = SyncScheduler.compute(Arc::new(d.graph().clone()), &[d.handle().clone()]).unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(d.run(&SyncScheduler).unwrap(), (1, true));
    }

    #[test]
    fn test_self_join() {
        let d = Deferred::lift(21usize, None);
        let doubled = d.join(&d, |a, b| a + b);
        assert_eq!(doubled.run(&SyncScheduler).unwrap(), 42);
        assert_eq!(doubled.run(&GreedyScheduler::new(2)).unwrap(), 42);
    }

    #[test]
    fn test_greedy_reports_panics() {
        let d = Deferred::lift(1usize, None).apply(|x| {
            if *x == 1 {
                panic!("boom");
            }
            *x
        });
        match d.run(&GreedyScheduler::new(2)) {
            Err(ExecError::Panicked(_)) => (),
            other => panic!("unexpected: {:?}", other)
        }
    }

    #[test]
    fn test_adaptive_clamps_workers() {
        let parts: Vec<_> = (0..16usize).map(|x| Deferred::lift(x, None)).collect();
        let total = tree_reduce(&parts, |a, b| a + b).unwrap();
        let graph = total.graph();

        let narrow = AdaptiveScheduler::new(1, 4);
        assert_eq!(narrow.workers_for(&graph, &[total.handle().clone()]), 4);
        let wide = AdaptiveScheduler::new(1, 200);
        assert_eq!(wide.workers_for(&graph, &[total.handle().clone()]), 16);
        assert_eq!(total.run(&narrow).unwrap(), 120);
    }

    #[test]
    fn test_adaptive_range_is_normalised() {
        assert_eq!(AdaptiveScheduler::new(0, 0).range(), (1, 1));
        assert_eq!(AdaptiveScheduler::new(5, 2).range(), (5, 5));
    }
}
