use dsq_common::{ColumnIdent, DsqError, QualifiedName, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::join_pair::JoinPair;
use crate::query_spec::{OrderBy, QuerySpec};
use crate::split::RelationSet;
use crate::symbol::{Field, Symbol};

/// Base relation together with its query spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueriedTable {
    pub name: QualifiedName,
    pub spec: QuerySpec,
}

impl QueriedTable {
    pub fn new(name: impl Into<QualifiedName>, spec: QuerySpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

/// A named source of rows: a base table or a two-table join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueriedRelation {
    Table(QueriedTable),
    Join(Box<TwoTableJoin>),
}

impl QueriedRelation {
    pub fn qualified_name(&self) -> &QualifiedName {
        match self {
            QueriedRelation::Table(table) => &table.name,
            QueriedRelation::Join(join) => join.name(),
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        match self {
            QueriedRelation::Table(table) => &table.spec,
            QueriedRelation::Join(join) => &join.spec,
        }
    }

    pub fn spec_mut(&mut self) -> &mut QuerySpec {
        match self {
            QueriedRelation::Table(table) => &mut table.spec,
            QueriedRelation::Join(join) => &mut join.spec,
        }
    }

    /// The join below this relation, if any.
    pub fn as_join(&self) -> Option<&TwoTableJoin> {
        match self {
            QueriedRelation::Table(_) => None,
            QueriedRelation::Join(join) => Some(join),
        }
    }
}

/// Binary join node in the planner's output tree, itself a queried relation.
///
/// The synthetic name is derived from the children's names so that field
/// references from above can be re-anchored uniquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoTableJoin {
    pub spec: QuerySpec,
    pub left: QueriedRelation,
    pub right: QueriedRelation,
    /// Ordering that had to wait for this join because it spans both sides
    /// or an outer join's nullable side.
    pub remaining_order_by: Option<OrderBy>,
    pub pair: JoinPair,
    name: QualifiedName,
}

impl TwoTableJoin {
    pub fn new(
        spec: QuerySpec,
        left: QueriedRelation,
        right: QueriedRelation,
        remaining_order_by: Option<OrderBy>,
        pair: JoinPair,
    ) -> Self {
        let name = join_name(left.qualified_name(), right.qualified_name());
        Self {
            spec,
            left,
            right,
            remaining_order_by,
            pair,
            name,
        }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Re-anchor a child's field onto this join.
    ///
    /// The new path is the old path prefixed with the owning relation's name,
    /// which keeps output names unique when both children expose the same
    /// column name. The owner's field must be among this join's outputs;
    /// anything else is a planner bug, not a user error.
    pub fn resolve_field(&self, owner: &QualifiedName, column: &ColumnIdent) -> Result<Field> {
        let provided = self.spec.outputs.iter().any(|output| {
            matches!(output, Symbol::Field(f) if f.relation == *owner && f.path == *column)
        });
        if !provided {
            return Err(DsqError::Internal(format!(
                "cannot resolve field {owner}.{column} against join relation {}",
                self.name
            )));
        }
        Ok(Field::new(
            self.name.clone(),
            ColumnIdent::child(owner.to_string(), column.output_name()),
        ))
    }
}

/// Synthetic name of the join of two relations, `join.<left>.<right>`.
pub fn join_name(left: &QualifiedName, right: &QualifiedName) -> QualifiedName {
    QualifiedName::new(vec![
        "join".to_string(),
        left.to_string(),
        right.to_string(),
    ])
}

/// Ordering fragment that must be applied after joining rather than inside
/// any single source, together with the relations it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemainingOrderBy {
    pub order_by: OrderBy,
    pub relations: IndexSet<QualifiedName>,
}

impl RemainingOrderBy {
    pub fn new(order_by: OrderBy, relations: IndexSet<QualifiedName>) -> Self {
        Self {
            order_by,
            relations,
        }
    }

    /// Whether every referenced relation is available in `names`.
    pub fn valid_for_relations(&self, names: &RelationSet) -> bool {
        self.relations.iter().all(|name| names.contains(name))
    }
}

/// Analyzed multi-source `SELECT`: the join planner's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSourceSelect {
    /// Sources in their syntactic order.
    pub sources: IndexMap<QualifiedName, QueriedRelation>,
    pub join_pairs: Vec<JoinPair>,
    pub spec: QuerySpec,
    pub remaining_order_by: Option<RemainingOrderBy>,
    /// Whether any output is eligible for a deferred fetch; when false the
    /// planner entry forces direct planning.
    pub fetch_eligible: bool,
}

impl MultiSourceSelect {
    pub fn new(
        sources: IndexMap<QualifiedName, QueriedRelation>,
        join_pairs: Vec<JoinPair>,
        spec: QuerySpec,
    ) -> Self {
        Self {
            sources,
            join_pairs,
            spec,
            remaining_order_by: None,
            fetch_eligible: false,
        }
    }
}
