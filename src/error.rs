//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = SweepError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during validation, training, scoring, or persistence.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The document sequence contained no trainable terms.
    #[error("corpus is empty: no document contains any token")]
    EmptyCorpus,
    /// The requested topic-count range is not a valid closed interval.
    #[error("invalid topic range: min_topics ({min_topics}) must be >= 1 and <= max_topics ({max_topics})")]
    InvalidRange {
        /// Lower bound supplied by the caller.
        min_topics: usize,
        /// Upper bound supplied by the caller.
        max_topics: usize,
    },
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The topic model trainer failed for a specific topic count.
    #[error("training failed for n_topics={n_topics}: {reason}")]
    TrainingFailure {
        /// Topic count whose training failed.
        n_topics: usize,
        /// Message reported by the trainer.
        reason: String,
    },
    /// A checkpointed operation was cancelled; partial state was flushed to `path`.
    #[error("cancelled after {} padded column(s); partial state saved to {path:?}", completed.len())]
    CancellationDuringCheckpoint {
        /// Recovery artifact written before the cancellation was re-signalled.
        path: PathBuf,
        /// Columns added before the cancellation was observed.
        completed: Vec<String>,
    },
    /// The sweep loop observed a cancellation between two topic counts.
    #[error("sweep cancelled after {} completed model(s)", completed.len())]
    SweepCancelled {
        /// Topic counts whose results were persisted before cancelling.
        completed: Vec<usize>,
    },
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Error bubbled up from the `csv` crate.
    #[error("csv error: {0}")]
    Csv(String),
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Rendering a figure failed.
    #[error("plot error: {0}")]
    Plot(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<csv::Error> for SweepError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SweepError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Returns `true` for the cancellation variants, which always leave durable partial state.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::CancellationDuringCheckpoint { .. } | Self::SweepCancelled { .. }
        )
    }
}
