use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error returned by fallible task closures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failures raised while executing a graph
#[derive(Debug, Error)]
pub enum ExecError {

    /// A task's closure returned an error
    #[error("task {task} failed: {source}")]
    Task {
        /// Name of the failing task
        task: String,
        /// Error returned by the task
        #[source]
        source: BoxError
    },

    /// A task panicked on a worker thread
    #[error("task {0} panicked")]
    Panicked(String),

    /// A value a task or caller needed was never produced
    #[error("output {0} was never produced")]
    MissingOutput(String),

    /// A task received an argument of an unexpected type
    #[error("task {0} received an argument of the wrong type")]
    TypeMismatch(String),

    /// An execution mode string could not be parsed
    #[error("unknown execution mode: {0}; expected one of single, local, cluster")]
    UnknownMode(String)
}
