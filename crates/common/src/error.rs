use thiserror::Error;

/// Canonical DSQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`DsqError::Planning`]: query shape/name/type issues discovered before execution
/// - [`DsqError::Unsupported`]: syntactically valid but intentionally unimplemented behavior
/// - [`DsqError::Internal`]: broken invariants; a bug in the engine, never a user error
/// - [`DsqError::Io`]: raw filesystem/network IO failures from std APIs
#[derive(Debug, Error)]
pub enum DsqError {
    /// Query planning/analyzer failures.
    ///
    /// Examples:
    /// - unknown relation/column
    /// - type mismatch in expressions or join keys
    #[error("planning error: {0}")]
    Planning(String),

    /// Valid request for a feature/shape not implemented in current version.
    ///
    /// Examples:
    /// - GROUP BY or aggregates combined with multiple sources
    /// - SQL constructs outside the supported subset
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Internal invariant violation.
    ///
    /// Examples:
    /// - a field that cannot be resolved against the relation that is
    ///   supposed to provide it
    #[error("internal error: {0}")]
    Internal(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard DSQ result alias.
pub type Result<T> = std::result::Result<T, DsqError>;
