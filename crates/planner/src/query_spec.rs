use dsq_common::Result;
use serde::{Deserialize, Serialize};

use crate::symbol::{replace_fields, visit_fields, Field, Symbol};

/// Filter attached to a query spec. `MatchAll` stands for an absent filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum WhereClause {
    #[default]
    MatchAll,
    Query(Symbol),
}

impl WhereClause {
    pub fn query(&self) -> Option<&Symbol> {
        match self {
            WhereClause::MatchAll => None,
            WhereClause::Query(q) => Some(q),
        }
    }

    pub fn has_query(&self) -> bool {
        matches!(self, WhereClause::Query(_))
    }

    /// True for a filter that can actually reduce the row count.
    pub fn is_filtering(&self) -> bool {
        matches!(self, WhereClause::Query(q) if !q.is_literal())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub symbol: Symbol,
    pub descending: bool,
    pub nulls_first: Option<bool>,
}

impl OrderByItem {
    pub fn asc(symbol: Symbol) -> Self {
        Self {
            symbol,
            descending: false,
            nulls_first: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub items: Vec<OrderByItem>,
}

impl OrderBy {
    pub fn new(items: Vec<OrderByItem>) -> Self {
        Self { items }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.items.iter().map(|item| &item.symbol)
    }

    pub fn copy_and_replace<F>(&self, replace: &F) -> Result<OrderBy>
    where
        F: Fn(&Field) -> Result<Symbol>,
    {
        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            items.push(OrderByItem {
                symbol: replace_fields(&item.symbol, replace)?,
                descending: item.descending,
                nulls_first: item.nulls_first,
            });
        }
        Ok(OrderBy { items })
    }
}

/// Outputs, filter, ordering and limit of a queried relation.
///
/// `group_by`/`has_aggregates` are analysis results carried along so the
/// planner entry can reject unsupported multi-source shapes; tree building
/// only ever runs on specs where both are empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuerySpec {
    pub outputs: Vec<Symbol>,
    pub where_clause: WhereClause,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub group_by: Vec<Symbol>,
    pub has_aggregates: bool,
}

impl QuerySpec {
    pub fn new(outputs: Vec<Symbol>) -> Self {
        Self {
            outputs,
            ..Default::default()
        }
    }

    /// Restrict the spec to symbols satisfying `predicate`.
    ///
    /// Intermediate join nodes export the plain `Field` leaves of their
    /// matching outputs and order-by entries (deduplicated, first-visit
    /// order) so that prefixed path resolution from the joins above always
    /// succeeds; the terminal node keeps the user-facing output symbols
    /// whole. Order-by entries are kept whole in both modes, limit and
    /// offset are copied.
    pub fn subset<P>(&self, predicate: &P, is_intermediate: bool) -> QuerySpec
    where
        P: Fn(&Symbol) -> bool,
    {
        let order_by = self.order_by.as_ref().and_then(|order_by| {
            let items: Vec<OrderByItem> = order_by
                .items
                .iter()
                .filter(|item| predicate(&item.symbol))
                .cloned()
                .collect();
            (!items.is_empty()).then_some(OrderBy { items })
        });

        let outputs = if is_intermediate {
            let mut fields: Vec<Symbol> = Vec::new();
            let mut collect = |symbol: &Symbol| {
                visit_fields(symbol, &mut |f| {
                    let leaf = Symbol::Field(f.clone());
                    if predicate(&leaf) && !fields.contains(&leaf) {
                        fields.push(leaf);
                    }
                });
            };
            for output in &self.outputs {
                collect(output);
            }
            for order_by in &order_by {
                for item in &order_by.items {
                    collect(&item.symbol);
                }
            }
            fields
        } else {
            self.outputs
                .iter()
                .filter(|s| predicate(*s))
                .cloned()
                .collect()
        };

        QuerySpec {
            outputs,
            where_clause: self.where_clause.clone(),
            order_by,
            limit: self.limit,
            offset: self.offset,
            group_by: Vec::new(),
            has_aggregates: false,
        }
    }

    /// Apply a field replacer to every contained symbol.
    pub fn copy_and_replace<F>(&self, replace: &F) -> Result<QuerySpec>
    where
        F: Fn(&Field) -> Result<Symbol>,
    {
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            outputs.push(replace_fields(output, replace)?);
        }
        let where_clause = match &self.where_clause {
            WhereClause::MatchAll => WhereClause::MatchAll,
            WhereClause::Query(q) => WhereClause::Query(replace_fields(q, replace)?),
        };
        let order_by = match &self.order_by {
            None => None,
            Some(order_by) => Some(order_by.copy_and_replace(replace)?),
        };
        let mut group_by = Vec::with_capacity(self.group_by.len());
        for symbol in &self.group_by {
            group_by.push(replace_fields(symbol, replace)?);
        }
        Ok(QuerySpec {
            outputs,
            where_clause,
            order_by,
            limit: self.limit,
            offset: self.offset,
            group_by,
            has_aggregates: self.has_aggregates,
        })
    }
}
