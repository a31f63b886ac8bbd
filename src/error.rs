//! Error types for registro-db
//!
//! Domain errors (invalid input, missing entities, lifecycle violations,
//! immutable-param conflicts) are produced intentionally by validation and
//! are caller-correctable. Storage/Io/Internal wrap unexpected persistence
//! failures with the cause preserved; `CorruptState` signals a violated
//! invariant and is never retried.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// registro-db error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed, empty, or out-of-range input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced experiment or run does not exist
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation on creation (e.g. duplicate experiment name)
    #[error("{0}")]
    AlreadyExists(String),

    /// Lifecycle-gated operation attempted against an entity in the wrong state
    #[error("{0}")]
    InvalidState(String),

    /// Conflicting value for an already-logged param key
    #[error(
        "changing param value is not allowed: key '{key}' was already logged \
         with value '{existing}' (attempted new value '{attempted}')"
    )]
    ImmutableParam {
        /// Param key in conflict
        key: String,
        /// Value already recorded for the key
        existing: String,
        /// Value the failing call attempted to record
        attempted: String,
    },

    /// Persistence schema revision mismatch detected at startup
    #[error("out-of-date database schema: found revision {found}, expected {expected}")]
    OutOfDateSchema {
        /// Revision recorded in the database
        found: String,
        /// Revision this build of the store requires
        expected: String,
    },

    /// An always-true invariant was found violated (e.g. duplicate primary key)
    #[error("corrupt store state: {0}")]
    CorruptState(String),

    /// Unexpected failure outside the persistence layer
    #[error("internal error: {0}")]
    Internal(String),

    /// Unexpected failure from the persistence layer
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// True when the underlying SQLite failure is a constraint violation.
///
/// Constraint-driven conflict detection is the store's only mutual-exclusion
/// mechanism, so callers inspect this before translating a failed insert into
/// a domain error (`AlreadyExists`, `ImmutableParam`).
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
