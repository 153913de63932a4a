//! Multi-table join planning for DSQ.
//!
//! Architecture role:
//! - rewrites an analyzed multi-source select into a left-deep tree of
//!   two-table joins for downstream physical planning
//! - chooses the relation order that maximizes join-predicate push-down,
//!   honoring `ORDER BY` prefixes and outer-join constraints
//! - distributes `WHERE` fragments and `ON` conditions to the earliest pair
//!   able to evaluate them, re-anchoring field references as synthetic
//!   relations are introduced
//!
//! Key modules:
//! - [`symbol`]
//! - [`query_spec`]
//! - [`relation`]
//! - [`join_pair`]
//! - [`split`]
//! - [`ordering`]
//! - [`tree`]
//! - [`consumer`]

pub mod consumer;
pub mod join_pair;
pub mod ordering;
pub mod query_spec;
pub mod relation;
pub mod split;
pub mod symbol;
pub mod tree;

pub use consumer::*;
pub use join_pair::*;
pub use ordering::*;
pub use query_spec::*;
pub use relation::*;
pub use split::*;
pub use symbol::*;
pub use tree::*;
