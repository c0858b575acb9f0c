use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BoxError, ExecError};
use crate::graph::*;
use crate::scheduler::Scheduler;
use crate::task::{DynFn, DynFn2, BASS};

struct Lift<A>(A);

impl <A: Any + Send + Sync + Clone> Input for Lift<A> {
    fn read(&self) -> BASS {
        Box::new(self.0.clone())
    }
}

/// A lazily evaluated value of type `A`, backed by the graph that produces it.
pub struct Deferred<A> {
    graph: Graph,
    items: PhantomData<fn() -> A>,
    handle: Arc<Handle>
}

impl <A> Clone for Deferred<A> {
    fn clone(&self) -> Self {
        Deferred {
            graph: self.graph.clone(),
            items: PhantomData,
            handle: self.handle.clone()
        }
    }
}

impl <A: Any + Send + Sync> Deferred<A> {

    /// Applies an infallible function to the deferred value.
    pub fn apply<B: Any + Send + Sync, F: Send + Sync + 'static + Fn(&A) -> B>(&self, f: F) -> Deferred<B> {
        self.try_apply(move |a| Ok::<B, BoxError>(f(a)))
    }

    /// Applies a fallible function to the deferred value.  An error fails every
    /// computation that depends on the result.
    pub fn try_apply<
        B: Any + Send + Sync,
        E: Into<BoxError>,
        F: Send + Sync + 'static + Fn(&A) -> Result<B, E>
    >(&self, f: F) -> Deferred<B> {
        let mut ng = self.graph.clone();
        let handle = ng.add_task(
            FnArgs::Single(self.handle.clone()),
            DynFn::new(move |a: &A| -> Result<B, BoxError> { f(a).map_err(Into::into) }),
            "Apply");
        Deferred {
            graph: ng,
            items: PhantomData,
            handle: handle
        }
    }

    /// Combines two deferred values with an infallible joiner.
    pub fn join<B: Any + Send + Sync, C: Any + Send + Sync, F: Send + Sync + 'static + Fn(&A, &B) -> C>(&self, other: &Deferred<B>, f: F) -> Deferred<C> {
        self.try_join(other, move |a, b| Ok::<C, BoxError>(f(a, b)))
    }

    /// Combines two deferred values with a fallible joiner.
    pub fn try_join<
        B: Any + Send + Sync,
        C: Any + Send + Sync,
        E: Into<BoxError>,
        F: Send + Sync + 'static + Fn(&A, &B) -> Result<C, E>
    >(&self, other: &Deferred<B>, f: F) -> Deferred<C> {
        let mut ng = self.graph.merge(&other.graph);
        let handle = ng.add_task(
            FnArgs::Join(self.handle.clone(), other.handle.clone()),
            DynFn2::new(move |a: &A, b: &B| -> Result<C, BoxError> { f(a, b).map_err(Into::into) }),
            "Join");

        Deferred {
            graph: ng,
            items: PhantomData,
            handle: handle
        }
    }

    /// Handle of the node producing this value
    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    /// Number of nodes needed to produce this value
    pub fn graph_size(&self) -> usize {
        self.graph.len()
    }

    /// Graph producing this value
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

impl <A: Any + Send + Sync + Clone> Deferred<A> {

    /// Lifts a concrete value into the graph.
    pub fn lift(a: A, name: Option<&str>) -> Self {
        let mut graph = Graph::new();
        let handle = graph.add_input(Lift(a), name.unwrap_or("Input"));
        Deferred {
            graph: graph,
            items: PhantomData,
            handle: handle
        }
    }

    /// Executes the graph on the given scheduler, blocking until the value is ready.
    pub fn run<S: Scheduler + ?Sized>(&self, s: &S) -> Result<A, ExecError> {
        let mut outputs = s.compute(Arc::new(self.graph.clone()), &[self.handle.clone()])?;
        let out = outputs.pop()
            .ok_or_else(|| ExecError::MissingOutput(self.handle.to_string()))?;
        match Arc::try_unwrap(out) {
            Ok(boxed) => boxed.downcast::<A>()
                .map(|a| *a)
                .map_err(|_| ExecError::TypeMismatch(self.handle.to_string())),
            Err(shared) => shared.downcast_ref::<A>()
                .cloned()
                .ok_or_else(|| ExecError::TypeMismatch(self.handle.to_string()))
        }
    }
}

/// Applies `f` to every deferred value, passing along its position.
pub fn batch_apply<
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    F: 'static + Sync + Send + Clone + Fn(usize, &A) -> B
    >(defs: &[Deferred<A>], f: F)
-> Vec<Deferred<B>> {
    try_batch_apply(defs, move |idx, a| Ok::<B, BoxError>(f(idx, a)))
}

/// Fallible form of `batch_apply`.
pub fn try_batch_apply<
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    E: Into<BoxError>,
    F: 'static + Sync + Send + Clone + Fn(usize, &A) -> Result<B, E>
    >(defs: &[Deferred<A>], f: F)
-> Vec<Deferred<B>> {
    defs.iter().enumerate().map(|(idx, p)| {
        let mf = f.clone();
        p.try_apply(move |vs| mf(idx, vs))
    }).collect()
}

/// Pairwise joins deferred values until a single one remains.  Returns `None`
/// when `defs` is empty.
pub fn tree_reduce<A: Any + Send + Sync,
                   F: 'static + Sync + Send + Clone + Fn(&A, &A) -> A
>(
    defs: &[Deferred<A>],
    f: F
) -> Option<Deferred<A>> {
    tree_reduce_until(defs, 1, f).map(|mut defs| {
        defs.remove(0)
    })
}

/// Pairwise joins deferred values until at most `parts` remain.
pub fn tree_reduce_until<A: Any + Send + Sync,
                   F: 'static + Sync + Send + Clone + Fn(&A, &A) -> A
>(
    defs: &[Deferred<A>],
    parts: usize,
    f: F
) -> Option<Vec<Deferred<A>>> {
    pairwise(defs, parts, |l, r| l.join(r, f.clone()))
}

/// Fallible form of `tree_reduce`.
pub fn try_tree_reduce<A: Any + Send + Sync,
                       E: Into<BoxError>,
                       F: 'static + Sync + Send + Clone + Fn(&A, &A) -> Result<A, E>
>(
    defs: &[Deferred<A>],
    f: F
) -> Option<Deferred<A>> {
    pairwise(defs, 1, |l, r| l.try_join(r, f.clone()))
        .map(|mut defs| defs.remove(0))
}

fn pairwise<A: Any + Send + Sync, J: Fn(&Deferred<A>, &Deferred<A>) -> Deferred<A>>(
    defs: &[Deferred<A>],
    parts: usize,
    join: J
) -> Option<Vec<Deferred<A>>> {
    if defs.is_empty() {
        return None
    }
    let mut pass = defs.to_vec();
    while pass.len() > parts.max(1) {
        let mut next = Vec::with_capacity(pass.len() / 2 + 1);
        for pair in pass.chunks(2) {
            match pair {
                [l, r] => next.push(join(l, r)),
                [odd] => next.push(odd.clone()),
                _ => unreachable!()
            }
        }
        pass = next;
    }
    Some(pass)
}

#[cfg(test)]
mod def_test {
    use super::*;
    use crate::scheduler::{GreedyScheduler, LeveledScheduler, SyncScheduler};

    #[test]
    fn test_tree_reduce() {
        let v: Vec<_> = (0..999usize)
            .map(|x| Deferred::lift(x, None))
            .collect();

        let res: usize = (0..999usize).sum();

        let agg = tree_reduce(&v, |x, y| x + y).unwrap();
        assert_eq!(agg.run(&LeveledScheduler).unwrap(), res);
        assert_eq!(agg.run(&SyncScheduler).unwrap(), res);
        assert_eq!(agg.run(&GreedyScheduler::new(4)).unwrap(), res);
    }

    #[test]
    fn test_tree_reduce_empty() {
        let v: Vec<Deferred<usize>> = Vec::new();
        assert!(tree_reduce(&v, |x, y| x + y).is_none());
    }

    #[test]
    fn test_tree_reduce_until_parts() {
        let v: Vec<_> = (0..10usize).map(|x| Deferred::lift(x, None)).collect();
        let parts = tree_reduce_until(&v, 3, |x, y| x + y).unwrap();
        assert!(parts.len() <= 3);
        let total: usize = parts.iter().map(|p| p.run(&SyncScheduler).unwrap()).sum();
        assert_eq!(total, 45);
    }

    #[test]
    fn test_join() {
        let hello = Deferred::lift("Hello".to_owned(), None);
        let world = Deferred::lift("World".to_owned(), None);
        let world_exclaim = world.apply(|w| format!("{}!", w));
        let hello_world = hello.join(&world_exclaim, |h, w| format!("{} {}", h, w));
        assert_eq!(hello_world.run(&SyncScheduler).unwrap(), "Hello World!");
    }

    #[test]
    fn test_try_apply_failure_propagates() {
        let start = Deferred::lift(3usize, Some("three"));
        let failed = start.try_apply(|x| if *x > 2 { Err("too large") } else { Ok(*x) });
        let downstream = failed.apply(|x| x + 1);
        for result in vec![
            downstream.run(&SyncScheduler),
            downstream.run(&LeveledScheduler),
            downstream.run(&GreedyScheduler::new(2))
        ] {
            match result {
                Err(ExecError::Task { source, .. }) => assert_eq!(source.to_string(), "too large"),
                other => panic!("unexpected result: {:?}", other)
            }
        }
    }

    #[test]
    fn test_try_tree_reduce() {
        let v: Vec<_> = (1..5i64).map(|x| Deferred::lift(x, None)).collect();
        let product = try_tree_reduce(&v, |x, y| x.checked_mul(*y).ok_or("overflow")).unwrap();
        assert_eq!(product.run(&SyncScheduler).unwrap(), 24);

        let big: Vec<_> = vec![i64::MAX, 2].into_iter().map(|x| Deferred::lift(x, None)).collect();
        let overflow = try_tree_reduce(&big, |x, y| x.checked_mul(*y).ok_or("overflow")).unwrap();
        assert!(overflow.run(&SyncScheduler).is_err());
    }
}
