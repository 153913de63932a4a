use dsq_common::{ColumnIdent, QualifiedName, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

/// Reference to a column of a specific relation.
///
/// Ownership is carried by name; resolving a field against the relation that
/// provides it goes through the planner's context, never a back-pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub relation: QualifiedName,
    pub path: ColumnIdent,
}

impl Field {
    pub fn new(relation: impl Into<QualifiedName>, path: ColumnIdent) -> Self {
        Self {
            relation: relation.into(),
            path,
        }
    }
}

/// Analyzed expression tree.
///
/// Symbols are immutable value trees; every transformation returns a new
/// tree. `And` is kept as a dedicated variant because the predicate splitter
/// and condition merging operate on top-level conjunctions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Symbol {
    Field(Field),
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Symbol>,
        op: BinaryOp,
        right: Box<Symbol>,
    },
    And(Box<Symbol>, Box<Symbol>),
    Or(Box<Symbol>, Box<Symbol>),
    Not(Box<Symbol>),
}

impl Symbol {
    /// Shorthand for a field symbol on a plain column.
    pub fn field(relation: impl Into<QualifiedName>, column: impl Into<String>) -> Self {
        Symbol::Field(Field::new(relation, ColumnIdent::new(column)))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Symbol::Literal(_))
    }
}

/// Split a predicate on its top-level conjunctions.
pub fn split_conjuncts(symbol: Symbol) -> Vec<Symbol> {
    match symbol {
        Symbol::And(a, b) => {
            let mut v = split_conjuncts(*a);
            v.extend(split_conjuncts(*b));
            v
        }
        other => vec![other],
    }
}

/// AND-combine a list of predicates; empty input folds to `true`.
pub fn combine_conjuncts(mut symbols: Vec<Symbol>) -> Symbol {
    if symbols.is_empty() {
        return Symbol::Literal(LiteralValue::Boolean(true));
    }
    let first = symbols.remove(0);
    symbols
        .into_iter()
        .fold(first, |acc, s| Symbol::And(Box::new(acc), Box::new(s)))
}

/// Rebuild a symbol tree, substituting every `Field` through `replace`.
///
/// Structure outside substitutions is preserved. The replacer is fallible so
/// that a field which cannot be re-anchored surfaces as an internal error
/// instead of a panic.
pub fn replace_fields<F>(symbol: &Symbol, replace: &F) -> Result<Symbol>
where
    F: Fn(&Field) -> Result<Symbol>,
{
    Ok(match symbol {
        Symbol::Field(f) => replace(f)?,
        Symbol::Literal(v) => Symbol::Literal(v.clone()),
        Symbol::BinaryOp { left, op, right } => Symbol::BinaryOp {
            left: Box::new(replace_fields(left, replace)?),
            op: *op,
            right: Box::new(replace_fields(right, replace)?),
        },
        Symbol::And(a, b) => Symbol::And(
            Box::new(replace_fields(a, replace)?),
            Box::new(replace_fields(b, replace)?),
        ),
        Symbol::Or(a, b) => Symbol::Or(
            Box::new(replace_fields(a, replace)?),
            Box::new(replace_fields(b, replace)?),
        ),
        Symbol::Not(inner) => Symbol::Not(Box::new(replace_fields(inner, replace)?)),
    })
}

/// Visit every `Field` of a symbol tree, depth first, left to right.
pub fn visit_fields<F>(symbol: &Symbol, visit: &mut F)
where
    F: FnMut(&Field),
{
    match symbol {
        Symbol::Field(f) => visit(f),
        Symbol::Literal(_) => {}
        Symbol::BinaryOp { left, right, .. } => {
            visit_fields(left, visit);
            visit_fields(right, visit);
        }
        Symbol::And(a, b) | Symbol::Or(a, b) => {
            visit_fields(a, visit);
            visit_fields(b, visit);
        }
        Symbol::Not(inner) => visit_fields(inner, visit),
    }
}

/// Relations referenced by any `Field` of the tree, in first-visit order.
pub fn collect_relation_names(symbol: &Symbol) -> IndexSet<QualifiedName> {
    let mut names = IndexSet::new();
    visit_fields(symbol, &mut |f| {
        names.insert(f.relation.clone());
    });
    names
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Field(field) => write!(f, "{}.{}", field.relation, field.path),
            Symbol::Literal(v) => match v {
                LiteralValue::Int64(i) => write!(f, "{i}"),
                LiteralValue::Float64(x) => write!(f, "{x}"),
                LiteralValue::Utf8(s) => write!(f, "'{s}'"),
                LiteralValue::Boolean(b) => write!(f, "{b}"),
                LiteralValue::Null => write!(f, "NULL"),
            },
            Symbol::BinaryOp { left, op, right } => match op {
                BinaryOp::Eq => write!(f, "({left} = {right})"),
                BinaryOp::NotEq => write!(f, "({left} <> {right})"),
                BinaryOp::Lt => write!(f, "({left} < {right})"),
                BinaryOp::LtEq => write!(f, "({left} <= {right})"),
                BinaryOp::Gt => write!(f, "({left} > {right})"),
                BinaryOp::GtEq => write!(f, "({left} >= {right})"),
                BinaryOp::Plus => write!(f, "add({left}, {right})"),
                BinaryOp::Minus => write!(f, "subtract({left}, {right})"),
                BinaryOp::Multiply => write!(f, "multiply({left}, {right})"),
                BinaryOp::Divide => write!(f, "divide({left}, {right})"),
            },
            Symbol::And(a, b) => write!(f, "({a} AND {b})"),
            Symbol::Or(a, b) => write!(f, "({a} OR {b})"),
            Symbol::Not(inner) => write!(f, "(NOT {inner})"),
        }
    }
}
