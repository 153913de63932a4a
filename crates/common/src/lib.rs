#![deny(missing_docs)]

//! Shared error types and identifiers for DSQ crates.
//!
//! Architecture role:
//! - provides the common [`DsqError`] / [`Result`] contracts
//! - defines the identifier types passed across layers, most importantly
//!   [`QualifiedName`] for relations and [`ColumnIdent`] for column paths
//!
//! Key modules:
//! - [`error`]
//! - [`ids`]

/// Shared error taxonomy.
pub mod error;
/// Relation and column identifier types.
pub mod ids;

pub use error::{DsqError, Result};
pub use ids::{ColumnIdent, QualifiedName};
