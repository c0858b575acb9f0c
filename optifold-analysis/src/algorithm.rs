//! Algorithm
//! ---
//! An `Algorithm` turns each record into a partial result with `apply`,
//! partials are merged with `Combine`, and the fully accumulated partial is
//! turned into the algorithm's output by `finish`.
//!
//! Reductions hold algorithms behind `AlgorithmRef`, a type-erased handle,
//! so algorithms with different partial and output types can share one pass
//! over the records.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use optifold::BoxError;

use crate::cache;
use crate::combine::Combine;
use crate::error::{Error, Result};

/// A reducer over records of type `R`.
///
/// `apply` must depend only on its record: it runs on worker threads in an
/// unspecified order.  `finish` runs once per reduction on the calling thread
/// and may perform I/O.
pub trait Algorithm<R>: Send + Sync + 'static {
    /// Per-record and accumulated intermediate value
    type Partial: Combine + Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Value handed back to the caller
    type Output: Send + 'static;

    /// Readable name used in logs and errors
    fn name(&self) -> String {
        let full = type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_owned()
    }

    /// Cache key for the accumulated partial.  `None` disables caching.
    fn key(&self) -> Option<String> {
        None
    }

    fn apply(&self, record: &R) -> std::result::Result<Self::Partial, BoxError>;

    fn finish(&self, partial: Self::Partial) -> std::result::Result<Self::Output, BoxError>;
}

/// Type-erased partial result
pub type ErasedPartial = Arc<dyn Any + Send + Sync>;

/// Shared handle to any algorithm over records of type `R`
pub type AlgorithmRef<R> = Arc<dyn DynAlgorithm<R>>;

/// Wraps an algorithm for use in a reduction.
pub fn boxed<R: 'static, A: Algorithm<R>>(algorithm: A) -> AlgorithmRef<R> {
    Arc::new(algorithm)
}

/// Object-safe view of `Algorithm`, implemented for every algorithm.
pub trait DynAlgorithm<R>: Send + Sync {
    fn name(&self) -> String;
    fn key(&self) -> Option<String>;
    fn apply_any(&self, record: &R) -> Result<ErasedPartial>;
    fn combine_any(&self, left: &ErasedPartial, right: &ErasedPartial) -> Result<ErasedPartial>;
    fn encode(&self, partial: &ErasedPartial) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<ErasedPartial>;
    fn finish_any(&self, partial: ErasedPartial) -> Result<Outcome>;
}

fn expect_partial<'a, R, A: Algorithm<R>>(alg: &A, partial: &'a ErasedPartial) -> Result<&'a A::Partial> {
    partial.downcast_ref::<A::Partial>().ok_or_else(|| {
        Error::Invariant(format!("partial result handed to {} has the wrong type", <A as Algorithm<R>>::name(alg)))
    })
}

impl <R, A: Algorithm<R>> DynAlgorithm<R> for A {

    fn name(&self) -> String {
        <A as Algorithm<R>>::name(self)
    }

    fn key(&self) -> Option<String> {
        <A as Algorithm<R>>::key(self)
    }

    fn apply_any(&self, record: &R) -> Result<ErasedPartial> {
        let partial = <A as Algorithm<R>>::apply(self, record).map_err(|e| Error::Algorithm {
            algorithm: <A as Algorithm<R>>::name(self),
            source: e
        })?;
        Ok(Arc::new(partial))
    }

    fn combine_any(&self, left: &ErasedPartial, right: &ErasedPartial) -> Result<ErasedPartial> {
        let l = expect_partial::<R, A>(self, left)?;
        let r = expect_partial::<R, A>(self, right)?;
        Ok(Arc::new(l.combine(r)?))
    }

    fn encode(&self, partial: &ErasedPartial) -> Result<Vec<u8>> {
        cache::encode(expect_partial::<R, A>(self, partial)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ErasedPartial> {
        let partial: A::Partial = cache::decode(bytes)?;
        Ok(Arc::new(partial))
    }

    fn finish_any(&self, partial: ErasedPartial) -> Result<Outcome> {
        let name = <A as Algorithm<R>>::name(self);
        let typed = partial.downcast::<A::Partial>().map_err(|_| {
            Error::Invariant(format!("partial result handed to {} has the wrong type", name))
        })?;
        let owned = Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone());
        let output = <A as Algorithm<R>>::finish(self, owned).map_err(|e| Error::Algorithm {
            algorithm: name.clone(),
            source: e
        })?;
        Ok(Outcome { algorithm: name, value: Box::new(output) })
    }
}

/// Finished output of one algorithm
pub struct Outcome {
    algorithm: String,
    value: Box<dyn Any + Send>
}

impl Outcome {
    /// Name of the algorithm that produced this output
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Takes the output as its concrete type.
    pub fn downcast<T: Any>(self) -> Result<T> {
        let algorithm = self.algorithm;
        self.value.downcast::<T>()
            .map(|v| *v)
            .map_err(|_| Error::Invariant(format!("output of {} is not a {}", algorithm, type_name::<T>())))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Outcome({})", self.algorithm)
    }
}
