use dsq_common::{QualifiedName, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::query_spec::QuerySpec;
use crate::symbol::{combine_conjuncts, replace_fields, Field, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    /// Outer joins introduce NULL rows on at least one side; relations taking
    /// part in one may not be reordered across it.
    pub fn is_outer(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Right | JoinType::Full)
    }

    /// The kind describing the same join read right-to-left.
    pub fn invert(self) -> JoinType {
        match self {
            JoinType::Left => JoinType::Right,
            JoinType::Right => JoinType::Left,
            other => other,
        }
    }
}

/// Direct join between two relations: direction, kind and optional predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPair {
    pub left: QualifiedName,
    pub right: QualifiedName,
    pub kind: JoinType,
    pub condition: Option<Symbol>,
}

impl JoinPair {
    pub fn new(
        left: impl Into<QualifiedName>,
        right: impl Into<QualifiedName>,
        kind: JoinType,
        condition: Option<Symbol>,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            kind,
            condition,
        }
    }

    pub fn cross_join(left: impl Into<QualifiedName>, right: impl Into<QualifiedName>) -> Self {
        Self::new(left, right, JoinType::Cross, None)
    }

    /// The same pair read right-to-left; the kind is mirrored.
    pub fn reverse(self) -> JoinPair {
        JoinPair {
            left: self.right,
            right: self.left,
            kind: self.kind.invert(),
            condition: self.condition,
        }
    }

    fn connects(&self, a: &QualifiedName, b: &QualifiedName) -> bool {
        (self.left == *a && self.right == *b) || (self.left == *b && self.right == *a)
    }
}

/// First pair joining `a` to `b`.
///
/// With `exact` the orientation must match. Without it a reversed match is
/// accepted too, unless the pair is an outer join: outer pairs are
/// direction-sensitive, and refusing the reversed match here is what lets
/// the order chooser treat a backwards outer adjacency as not joined.
pub fn of_relations<'a>(
    a: &QualifiedName,
    b: &QualifiedName,
    pairs: &'a [JoinPair],
    exact: bool,
) -> Option<&'a JoinPair> {
    pairs.iter().find(|pair| {
        if pair.left == *a && pair.right == *b {
            return true;
        }
        if exact {
            return false;
        }
        pair.left == *b && pair.right == *a && !pair.kind.is_outer()
    })
}

/// Merge every pair connecting `{a, b}` into one.
///
/// Conditions are AND-combined; matched pairs are removed from the list when
/// `remove` is set. A pair matched right-to-left is reversed so the result is
/// oriented `a` then `b`. When nothing connects the two relations an inner
/// pair without condition is synthesized, which is the tree builder's
/// contract for relations made adjacent by reordering alone.
pub fn of_relations_with_merged_conditions(
    a: &QualifiedName,
    b: &QualifiedName,
    pairs: &mut Vec<JoinPair>,
    remove: bool,
) -> JoinPair {
    let mut matched: Vec<JoinPair> = Vec::new();
    if remove {
        let mut kept = Vec::with_capacity(pairs.len());
        for pair in pairs.drain(..) {
            if pair.connects(a, b) {
                matched.push(pair);
            } else {
                kept.push(pair);
            }
        }
        *pairs = kept;
    } else {
        matched = pairs.iter().filter(|p| p.connects(a, b)).cloned().collect();
    }

    if matched.is_empty() {
        return JoinPair::new(a.clone(), b.clone(), JoinType::Inner, None);
    }

    let mut merged = matched.remove(0);
    if merged.left == *b {
        merged = merged.reverse();
    }
    let mut conditions: Vec<Symbol> = merged.condition.take().into_iter().collect();
    conditions.extend(matched.into_iter().filter_map(|p| p.condition));
    merged.condition = (!conditions.is_empty()).then(|| combine_conjuncts(conditions));
    merged
}

/// Relations appearing on either side of any outer pair, in first-seen order.
pub fn outer_join_relations(pairs: &[JoinPair]) -> IndexSet<QualifiedName> {
    let mut names = IndexSet::new();
    for pair in pairs {
        if pair.kind.is_outer() {
            names.insert(pair.left.clone());
            names.insert(pair.right.clone());
        }
    }
    names
}

/// Clear `ORDER BY` from the spec of every nullable side of `pair`.
///
/// The join adds NULL rows on those sides, so an ordering applied inside the
/// child would be destroyed; it has to be re-applied above the join instead.
/// `left`/`right` name the tree's children; the pair itself may be oriented
/// either way relative to them.
pub fn remove_order_by_on_outer_relation(
    left: &QualifiedName,
    right: &QualifiedName,
    left_spec: &mut QuerySpec,
    right_spec: &mut QuerySpec,
    pair: &JoinPair,
) {
    let mut clear = |name: &QualifiedName| {
        if name == left {
            left_spec.order_by = None;
        } else if name == right {
            right_spec.order_by = None;
        }
    };
    match pair.kind {
        JoinType::Left => clear(&pair.right),
        JoinType::Right => clear(&pair.left),
        JoinType::Full => {
            clear(&pair.left);
            clear(&pair.right);
        }
        JoinType::Inner | JoinType::Cross => {}
    }
}

/// Rewrite pairs after `old_left`/`old_right` were absorbed into `new_name`.
///
/// Endpoints naming an absorbed relation are re-pointed at the synthetic
/// relation and every condition is mapped through the field replacer.
pub fn rewrite_names<F>(
    old_left: &QualifiedName,
    old_right: &QualifiedName,
    new_name: &QualifiedName,
    replace: &F,
    pairs: &mut [JoinPair],
) -> Result<()>
where
    F: Fn(&Field) -> Result<Symbol>,
{
    for pair in pairs.iter_mut() {
        if pair.left == *old_left || pair.left == *old_right {
            pair.left = new_name.clone();
        }
        if pair.right == *old_left || pair.right == *old_right {
            pair.right = new_name.clone();
        }
        if let Some(condition) = &pair.condition {
            pair.condition = Some(replace_fields(condition, replace)?);
        }
    }
    Ok(())
}
