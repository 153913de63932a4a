use dsq_common::{DsqError, QualifiedName, Result};
use indexmap::IndexSet;
use tracing::trace;

use crate::join_pair::{
    of_relations_with_merged_conditions, remove_order_by_on_outer_relation, rewrite_names,
    JoinPair,
};
use crate::ordering::order_by_join_conditions;
use crate::query_spec::{QuerySpec, WhereClause};
use crate::relation::{MultiSourceSelect, QueriedRelation, RemainingOrderBy, TwoTableJoin};
use crate::split::{merge_fragment, split, RelationSet, SplitMap};
use crate::symbol::{
    collect_relation_names, combine_conjuncts, replace_fields, visit_fields, Field, Symbol,
};

/// Build a map from relation sets to the join condition applicable once all
/// of those relations are present in the tree.
///
/// Every pair's `ON` condition is split into fragments keyed by its
/// referenced relations; fragments landing on the same key are AND-combined.
/// The tree builder drains this map to apply each condition as early as
/// possible.
pub fn build_join_conditions_map(join_pairs: &[JoinPair]) -> SplitMap {
    let mut conditions = SplitMap::new();
    for pair in join_pairs {
        if let Some(condition) = &pair.condition {
            for (key, fragment) in split(condition) {
                merge_fragment(&mut conditions, key, fragment);
            }
        }
    }
    conditions
}

/// Fold a multi-source select with `n >= 2` sources into a left-deep tree of
/// two-table joins, distributing the split `WHERE` and the join conditions
/// to the earliest node able to evaluate them.
pub fn build_two_table_join_tree(mut mss: MultiSourceSelect) -> Result<TwoTableJoin> {
    let mut split_query = SplitMap::new();
    if let WhereClause::Query(query) = &mss.spec.where_clause {
        split_query = split(query);
        mss.spec.where_clause = WhereClause::MatchAll;
    }

    let mut join_pairs = std::mem::take(&mut mss.join_pairs);
    let mut join_conditions = build_join_conditions_map(&join_pairs);
    let explicit: Vec<RelationSet> = join_conditions.keys().cloned().collect();
    let implicit: Vec<RelationSet> = split_query.keys().cloned().collect();
    let ordered = ordered_relation_names(&mss, &explicit, &implicit, &join_pairs);
    trace!(
        relations = %display_names(mss.sources.keys()),
        ordered = %display_names(ordered.iter()),
        "relation order chosen"
    );

    let mut names_iter = ordered.into_iter().peekable();
    let mut left_name = names_iter
        .next()
        .ok_or_else(|| DsqError::Internal("join tree requires at least two sources".to_string()))?;
    let mut left_relation = take_source(&mut mss, &left_name)?;
    let mut root_spec = mss.spec.clone();
    let mut remaining_order_by = mss.remaining_order_by.take();
    let mut current_set: RelationSet = [left_name.clone()].into_iter().collect();
    if names_iter.peek().is_none() {
        return Err(DsqError::Internal(
            "join tree requires at least two sources".to_string(),
        ));
    }

    while let Some(right_name) = names_iter.next() {
        let has_more = names_iter.peek().is_some();
        let mut right_relation = take_source(&mut mss, &right_name)?;
        current_set.insert(right_name.clone());
        let names: RelationSet = [left_name.clone(), right_name.clone()]
            .into_iter()
            .collect();

        let predicate =
            |symbol: &Symbol| collect_relation_names(symbol).iter().all(|n| names.contains(n));
        let mut new_spec = root_spec.subset(&predicate, has_more);
        if let Some(fragment) = split_query.shift_remove(&names) {
            new_spec.where_clause = WhereClause::Query(fragment);
        }
        if has_more {
            extend_outputs(
                &mut new_spec,
                &split_query,
                &join_conditions,
                &left_name,
                &right_name,
            );
        }

        let order_by_applies = remaining_order_by
            .as_ref()
            .is_some_and(|remaining| remaining.valid_for_relations(&names));
        let order_by_to_apply = if order_by_applies {
            remaining_order_by.take().map(|remaining| remaining.order_by)
        } else {
            None
        };

        let mut pair =
            of_relations_with_merged_conditions(&left_name, &right_name, &mut join_pairs, true);

        // Apply every join condition whose relations are all in the tree by
        // now. The merged pair's own condition was split into the map during
        // preparation, so the collected fragments replace it rather than
        // stack on top of it.
        let mut collected: Vec<Symbol> = Vec::new();
        join_conditions.retain(|key, condition| {
            if key.is_subset(&current_set) {
                collected.push(condition.clone());
                false
            } else {
                true
            }
        });
        pair.condition = (!collected.is_empty()).then(|| combine_conjuncts(collected));

        remove_order_by_on_outer_relation(
            &left_name,
            &right_name,
            left_relation.spec_mut(),
            right_relation.spec_mut(),
            &pair,
        );

        // The join adds NULL rows on outer sides, so any ordering carried in
        // `order_by_to_apply` runs above it, not inside the children.
        let join = TwoTableJoin::new(new_spec, left_relation, right_relation, order_by_to_apply, pair);

        if has_more {
            // Re-anchor everything still referring to the two children onto
            // the new synthetic relation. Paths are prefixed with the old
            // owner's name so they stay unique.
            let replace = |field: &Field| -> Result<Symbol> {
                if field.relation == left_name || field.relation == right_name {
                    Ok(Symbol::Field(join.resolve_field(&field.relation, &field.path)?))
                } else {
                    Ok(Symbol::Field(field.clone()))
                }
            };
            split_query =
                rewrite_split_query_names(split_query, &left_name, &right_name, join.name(), &replace)?;
            rewrite_names(&left_name, &right_name, join.name(), &replace, &mut join_pairs)?;
            if let Some(remaining) = remaining_order_by.take() {
                remaining_order_by = Some(rewrite_remaining_order_by(
                    remaining,
                    &left_name,
                    &right_name,
                    join.name(),
                    &replace,
                )?);
            }
            root_spec = root_spec.copy_and_replace(&replace)?;
            for condition in join_conditions.values_mut() {
                *condition = replace_fields(condition, &replace)?;
            }
        }

        left_name = join.name().clone();
        left_relation = QueriedRelation::Join(Box::new(join));
    }

    let QueriedRelation::Join(mut root) = left_relation else {
        return Err(DsqError::Internal(
            "join tree fold produced no join node".to_string(),
        ));
    };

    if !split_query.is_empty() {
        let residue: Vec<Symbol> = split_query.into_values().collect();
        root.spec.where_clause = WhereClause::Query(combine_conjuncts(residue));
    }

    clear_limits_below_last_filter(&mut root);
    Ok(*root)
}

/// Fast path for exactly two sources: no split, no reorder.
pub fn two_table_join(mut mss: MultiSourceSelect) -> Result<TwoTableJoin> {
    if mss.sources.len() != 2 {
        return Err(DsqError::Internal(format!(
            "two-table join requires exactly 2 sources, got {}",
            mss.sources.len()
        )));
    }
    let left_name = mss.sources.keys().next().cloned().ok_or_else(no_sources)?;
    let right_name = mss.sources.keys().nth(1).cloned().ok_or_else(no_sources)?;
    let mut join_pairs = std::mem::take(&mut mss.join_pairs);
    let pair = of_relations_with_merged_conditions(&left_name, &right_name, &mut join_pairs, true);

    let mut left_relation = take_source(&mut mss, &left_name)?;
    let mut right_relation = take_source(&mut mss, &right_name)?;
    remove_order_by_on_outer_relation(
        &left_name,
        &right_name,
        left_relation.spec_mut(),
        right_relation.spec_mut(),
        &pair,
    );

    let names: RelationSet = [left_name, right_name].into_iter().collect();
    let order_by_to_apply = match mss.remaining_order_by.take() {
        Some(remaining) if remaining.valid_for_relations(&names) => Some(remaining.order_by),
        _ => None,
    };

    Ok(TwoTableJoin::new(
        mss.spec,
        left_relation,
        right_relation,
        order_by_to_apply,
        pair,
    ))
}

fn no_sources() -> DsqError {
    DsqError::Internal("multi-source select has no sources".to_string())
}

fn take_source(mss: &mut MultiSourceSelect, name: &QualifiedName) -> Result<QueriedRelation> {
    mss.sources
        .shift_remove(name)
        .ok_or_else(|| DsqError::Internal(format!("unknown source relation {name}")))
}

/// Relation names in the order the tree should fold them: the `ORDER BY`
/// prefix first, completed by the order chooser.
fn ordered_relation_names(
    mss: &MultiSourceSelect,
    explicit: &[RelationSet],
    implicit: &[RelationSet],
    join_pairs: &[JoinPair],
) -> Vec<QualifiedName> {
    let mut pre_sorted: IndexSet<QualifiedName> = IndexSet::new();
    if let Some(order_by) = &mss.spec.order_by {
        for symbol in order_by.symbols() {
            pre_sorted.extend(collect_relation_names(symbol));
        }
    }
    let relations: Vec<QualifiedName> = mss.sources.keys().cloned().collect();
    let pre_sorted: Vec<QualifiedName> = pre_sorted.into_iter().collect();
    order_by_join_conditions(&relations, explicit, implicit, join_pairs, &pre_sorted)
}

/// Extend an intermediate node's outputs with every field that a pending
/// predicate still needs from the two relations being joined, so the symbol
/// survives upward and the joins above can evaluate it.
fn extend_outputs(
    spec: &mut QuerySpec,
    split_query: &SplitMap,
    join_conditions: &SplitMap,
    left: &QualifiedName,
    right: &QualifiedName,
) {
    let mut outputs = std::mem::take(&mut spec.outputs);
    let mut collect = |fragment: &Symbol| {
        visit_fields(fragment, &mut |field| {
            if field.relation == *left || field.relation == *right {
                let symbol = Symbol::Field(field.clone());
                if !outputs.contains(&symbol) {
                    outputs.push(symbol);
                }
            }
        });
    };
    // The map keys are not a reliable filter here: split-query keys track the
    // synthetic names while the join-conditions keys keep the original ones.
    // The owner check inside the walk is what decides.
    for fragment in split_query.values() {
        collect(fragment);
    }
    for condition in join_conditions.values() {
        collect(condition);
    }
    spec.outputs = outputs;
}

/// Rewrite the split-query keys and values after a join step.
///
/// Keys naming an absorbed relation collapse onto the synthetic name; when
/// two keys collide after substitution their fragments are AND-combined,
/// which is the canonical merge policy.
fn rewrite_split_query_names<F>(
    split_query: SplitMap,
    old_left: &QualifiedName,
    old_right: &QualifiedName,
    new_name: &QualifiedName,
    replace: &F,
) -> Result<SplitMap>
where
    F: Fn(&Field) -> Result<Symbol>,
{
    let mut rewritten = SplitMap::with_capacity(split_query.len());
    for (key, fragment) in split_query {
        let key: RelationSet = key
            .into_iter()
            .map(|name| {
                if name == *old_left || name == *old_right {
                    new_name.clone()
                } else {
                    name
                }
            })
            .collect();
        let fragment = replace_fields(&fragment, replace)?;
        merge_fragment(&mut rewritten, key, fragment);
    }
    Ok(rewritten)
}

fn rewrite_remaining_order_by<F>(
    remaining: RemainingOrderBy,
    old_left: &QualifiedName,
    old_right: &QualifiedName,
    new_name: &QualifiedName,
    replace: &F,
) -> Result<RemainingOrderBy>
where
    F: Fn(&Field) -> Result<Symbol>,
{
    let relations: IndexSet<QualifiedName> = remaining
        .relations
        .into_iter()
        .map(|name| {
            if name == *old_left || name == *old_right {
                new_name.clone()
            } else {
                name
            }
        })
        .collect();
    Ok(RemainingOrderBy::new(
        remaining.order_by.copy_and_replace(replace)?,
        relations,
    ))
}

/// Clear `LIMIT` on every join node strictly below the topmost node whose
/// `WHERE` actually filters. A limit may only be pushed below a node when no
/// filter underneath could reduce the row count further.
fn clear_limits_below_last_filter(root: &mut TwoTableJoin) {
    if root.spec.where_clause.is_filtering() {
        clear_limits_below(root);
    } else if let QueriedRelation::Join(child) = &mut root.left {
        clear_limits_below_last_filter(child);
    }
}

fn clear_limits_below(join: &mut TwoTableJoin) {
    if let QueriedRelation::Join(child) = &mut join.left {
        child.spec.limit = None;
        clear_limits_below(child);
    }
}

fn display_names<'a>(names: impl Iterator<Item = &'a QualifiedName>) -> String {
    let rendered: Vec<String> = names.map(|n| n.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}
