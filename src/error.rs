//! Typed error kinds for the store.
//!
//! All fallible APIs in this crate return [`eyre::Result`]; a `DbError` is
//! attached as the root of the report wherever the failure class matters to
//! the caller. Recover the kind with `report.downcast_ref::<DbError>()`;
//! the `Default` open mode does exactly that to decide whether a file is
//! merely "not yet a database" and can be reinitialized.

use thiserror::Error;

/// Error taxonomy of the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// On-disk layout is invalid: bad magic, unaligned file, truncated
    /// record. Recoverable only by reinitialization.
    #[error("structure error: {0}")]
    Structure(String),

    /// Caller supplied an out-of-range index or a malformed value.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Invariant violation detectable at call time (double free, duplicate
    /// class registration).
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A case the format does not currently cover.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// An identifier was rejected by the type system.
    #[error("type error: {0}")]
    Type(String),
}

impl DbError {
    /// True for the kinds the `Default` open mode treats as "not a database
    /// yet": structural damage and malformed contents.
    pub fn is_recoverable_open_failure(&self) -> bool {
        matches!(self, DbError::Structure(_) | DbError::BadArgument(_))
    }
}
