//! Typed failure kinds and their mapping to process exit codes.
//!
//! Most code propagates `anyhow::Result`; the variants here tag the failures
//! the top-level handler needs to distinguish. [`exit_code_for`] downcasts an
//! `anyhow::Error` back to a [`MemoError`] to pick the exit code.

use std::time::Duration;

/// Failure kinds surfaced to the CLI.
#[derive(Debug, thiserror::Error)]
pub enum MemoError {
    /// Bad user input: empty text/query, conflicting flags, unsupported
    /// extension, malformed repo-map, out-of-range flag values.
    #[error("{0}")]
    InvalidInput(String),

    /// A record or import path that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `forget --container` named a container the record does not belong to.
    #[error("record {id} belongs to {actual}, not {requested}")]
    WrongContainer {
        id: String,
        actual: String,
        requested: String,
    },

    /// FTS5 rejected the query text. Recovered inside search; only surfaces
    /// if something re-raises it.
    #[error("full-text query rejected: {0}")]
    FullTextQuery(String),

    /// Model inference exceeded the per-call deadline.
    #[error("embedding timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    /// Model load or inference failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Unique-key conflict on record ids or cache keys. Indicates a bug.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
}

/// Exit code for a failed top-level operation.
///
/// Input-validation failures exit 2 so scripts can tell them apart from
/// I/O, model, and database errors (exit 1).
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<MemoError>() {
        Some(MemoError::InvalidInput(_)) => 2,
        _ => 1,
    }
}
