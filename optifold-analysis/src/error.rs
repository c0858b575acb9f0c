use std::io;

use thiserror::Error;

use optifold::{BoxError, ExecError};

/// Errors raised by reductions, the cache, and the record source
#[derive(Debug, Error)]
pub enum Error {

    /// An algorithm's `apply` or `finish` failed
    #[error("algorithm {algorithm} failed: {source}")]
    Algorithm {
        /// Name of the failing algorithm
        algorithm: String,
        #[source]
        source: BoxError
    },

    /// Two partial results could not be combined
    #[error("incompatible partial results: {0}")]
    Incompatible(String),

    /// No cache entry exists for the key
    #[error("no cache entry for key {0}")]
    NotFound(String),

    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("compression error: {0}")]
    Compression(#[from] snap::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The execution substrate failed
    #[error("execution failed: {0}")]
    Execution(#[source] ExecError),

    /// A reduction was asked to fold a dataset without records
    #[error("cannot reduce an empty dataset")]
    EmptyDataset,

    /// An internal invariant did not hold
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A requested algorithm name is not registered
    #[error("unknown algorithm {name}; valid names are: {}", .valid.join(", "))]
    UnknownAlgorithm {
        name: String,
        valid: Vec<String>
    },

    #[error("invalid configuration: {0}")]
    Config(String)
}

impl From<ExecError> for Error {
    // Task failures carrying one of our own errors surface unchanged
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Task { task, source } => match source.downcast::<Error>() {
                Ok(inner) => *inner,
                Err(source) => Error::Execution(ExecError::Task { task: task, source: source })
            },
            other => Error::Execution(other)
        }
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
