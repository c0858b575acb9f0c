use std::any::Any;
use std::marker::PhantomData;

use crate::error::BoxError;

/// Type-erased value flowing between tasks
pub type BASS = Box<dyn Any + Send + Sync>;

/// Arguments handed to a task
pub enum DynArgs<'a> {
    /// Output of a single upstream node
    One(&'a BASS),

    /// Outputs of the two joined nodes
    Two(&'a BASS, &'a BASS)
}

/// Why a task could not produce its value
pub enum EvalError {
    /// Argument count or types did not match the task
    Mismatch,

    /// The task closure itself failed
    Failed(BoxError)
}

/// A task body with its argument types erased
pub trait DynRun: Send + Sync {
    /// Runs the task, downcasting arguments to the types it was built for
    fn eval(&self, val: DynArgs) -> Result<BASS, EvalError>;
}

/// Single argument task
pub struct DynFn<A,B,F: Fn(&A) -> Result<B, BoxError>>(F,PhantomData<fn(&A) -> B>);

impl <A,B,F: Fn(&A) -> Result<B, BoxError>> DynFn<A,B,F> {
    /// Wraps `f`
    pub fn new(f: F) -> Self {
        DynFn(f, PhantomData)
    }
}

impl <A: Any + Send + Sync, B: Any + Send + Sync, F: Send + Sync + Fn(&A) -> Result<B, BoxError>> DynRun for DynFn<A,B,F> {

    fn eval(&self, val: DynArgs) -> Result<BASS, EvalError> {
        match val {
            DynArgs::One(v) => {
                let a = v.downcast_ref::<A>().ok_or(EvalError::Mismatch)?;
                let b = self.0(a).map_err(EvalError::Failed)?;
                Ok(Box::new(b))
            },
            _ => Err(EvalError::Mismatch)
        }
    }
}

/// Two argument task
pub struct DynFn2<A,B,C,F: Fn(&A, &B) -> Result<C, BoxError>>(F,PhantomData<fn(&A, &B) -> C>);

impl <A,B,C,F: Fn(&A, &B) -> Result<C, BoxError>> DynFn2<A,B,C,F> {
    /// Wraps `f`
    pub fn new(f: F) -> Self {
        DynFn2(f, PhantomData)
    }
}

impl <A: Any + Send + Sync, B: Any + Send + Sync, C: Any + Send + Sync, F: Send + Sync + Fn(&A, &B) -> Result<C, BoxError>> DynRun for DynFn2<A,B,C,F> {

    fn eval(&self, val: DynArgs) -> Result<BASS, EvalError> {
        match val {
            DynArgs::Two(a, b) => {
                let a = a.downcast_ref::<A>().ok_or(EvalError::Mismatch)?;
                let b = b.downcast_ref::<B>().ok_or(EvalError::Mismatch)?;
                let c = self.0(a, b).map_err(EvalError::Failed)?;
                Ok(Box::new(c))
            },
            _ => Err(EvalError::Mismatch)
        }
    }
}
