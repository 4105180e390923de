//! Error types for probelog core.

use thiserror::Error;

/// Errors raised by core constructors.
///
/// Ingestion never fails: duplicates, stale records, and gaps are absorbed by
/// the reconciliation logic. Only contract violations at construction time
/// surface here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("sequence number is the unset sentinel")]
    UnsetSequence,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
