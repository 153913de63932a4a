use dsq_common::QualifiedName;
use indexmap::IndexSet;
use itertools::Itertools;

use crate::join_pair::{of_relations, outer_join_relations, JoinPair};
use crate::split::RelationSet;

/// Above this relation count the factorial search is replaced by the greedy
/// nearest-neighbor fallback.
const MAX_EXHAUSTIVE_RELATIONS: usize = 8;

/// Pick the relation order that maximizes join-predicate push-down in the
/// left-deep tree built later.
///
/// Policy, in order:
/// 1. `pre_sorted` (the `ORDER BY`-derived prefix) already covers all
///    relations: keep it.
/// 2. Two relations, or no join predicates at all: `pre_sorted` followed by
///    the missing relations in input order.
/// 3. No `pre_sorted`: relations as they appear in explicit key-sets, then
///    implicit key-sets, then the rest in input order.
/// 4. Otherwise enumerate permutations with the `pre_sorted` prefix fixed and
///    the tail in stable lexicographic order; an adjacency is a push-down
///    when the two relations are directly joined or their two-element set is
///    an explicit/implicit key; an adjacency across an outer-join boundary
///    without a direct pair invalidates the permutation. First fully pushed
///    down permutation wins, else the best-scoring one, else input order.
///
/// Ties break by enumeration order, so plans are reproducible.
pub fn order_by_join_conditions(
    relations: &[QualifiedName],
    explicit_keys: &[RelationSet],
    implicit_keys: &[RelationSet],
    join_pairs: &[JoinPair],
    pre_sorted: &[QualifiedName],
) -> Vec<QualifiedName> {
    if relations.len() == pre_sorted.len() {
        return pre_sorted.to_vec();
    }

    if relations.len() == 2
        || (join_pairs.is_empty() && explicit_keys.is_empty() && implicit_keys.is_empty())
    {
        let mut names: IndexSet<QualifiedName> = pre_sorted.iter().cloned().collect();
        names.extend(relations.iter().cloned());
        return names.into_iter().collect();
    }

    if pre_sorted.is_empty() {
        let mut names: IndexSet<QualifiedName> = IndexSet::new();
        names.extend(explicit_keys.iter().flatten().cloned());
        names.extend(implicit_keys.iter().flatten().cloned());
        names.extend(relations.iter().cloned());
        return names.into_iter().collect();
    }

    let outer = outer_join_relations(join_pairs);
    let tail: Vec<&QualifiedName> = relations
        .iter()
        .filter(|name| !pre_sorted.contains(*name))
        .collect();

    if relations.len() > MAX_EXHAUSTIVE_RELATIONS {
        return greedy_order(
            explicit_keys,
            implicit_keys,
            join_pairs,
            pre_sorted,
            &tail,
            &outer,
        );
    }

    let full_score = relations.len() - 1;
    let mut best: Option<Vec<QualifiedName>> = None;
    let mut best_score = 0;
    for permutation in tail.iter().permutations(tail.len()) {
        let candidate: Vec<QualifiedName> = pre_sorted
            .iter()
            .cloned()
            .chain(permutation.into_iter().map(|name| (*name).clone()))
            .collect();
        let Some(score) = push_down_score(&candidate, explicit_keys, implicit_keys, join_pairs, &outer)
        else {
            continue;
        };
        if score == full_score {
            return candidate;
        }
        if best.is_none() || score > best_score {
            best_score = score;
            best = Some(candidate);
        }
    }
    best.unwrap_or_else(|| relations.to_vec())
}

/// Number of pushed-down adjacencies, or `None` when the candidate crosses
/// an outer-join boundary without a direct pair.
fn push_down_score(
    candidate: &[QualifiedName],
    explicit_keys: &[RelationSet],
    implicit_keys: &[RelationSet],
    join_pairs: &[JoinPair],
    outer: &IndexSet<QualifiedName>,
) -> Option<usize> {
    let mut score = 0;
    for window in candidate.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        if of_relations(a, b, join_pairs, false).is_some() {
            score += 1;
            continue;
        }
        if outer.contains(a) || outer.contains(b) {
            return None;
        }
        let key: RelationSet = [a.clone(), b.clone()].into_iter().collect();
        if explicit_keys.contains(&key) || implicit_keys.contains(&key) {
            score += 1;
        }
    }
    Some(score)
}

/// Nearest-neighbor fallback for wide joins: repeatedly extend the order with
/// the remaining relation scoring highest against the last one, ties broken
/// by input order. Outer-join relations are only appended in their input
/// order and never across a boundary without a direct pair.
fn greedy_order(
    explicit_keys: &[RelationSet],
    implicit_keys: &[RelationSet],
    join_pairs: &[JoinPair],
    pre_sorted: &[QualifiedName],
    tail: &[&QualifiedName],
    outer: &IndexSet<QualifiedName>,
) -> Vec<QualifiedName> {
    let mut order: Vec<QualifiedName> = pre_sorted.to_vec();
    let mut remaining: Vec<QualifiedName> = tail.iter().map(|name| (*name).clone()).collect();
    if order.is_empty() && !remaining.is_empty() {
        order.push(remaining.remove(0));
    }
    while !remaining.is_empty() {
        let last = order[order.len() - 1].clone();
        let first_outer = remaining.iter().position(|name| outer.contains(name));
        let mut best_idx: Option<usize> = None;
        let mut best_score = -1i32;
        for (idx, candidate) in remaining.iter().enumerate() {
            if outer.contains(candidate) && first_outer != Some(idx) {
                continue;
            }
            let direct = of_relations(&last, candidate, join_pairs, false).is_some();
            if !direct && (outer.contains(&last) || outer.contains(candidate)) {
                continue;
            }
            let key: RelationSet = [last.clone(), candidate.clone()].into_iter().collect();
            let keyed = explicit_keys.contains(&key) || implicit_keys.contains(&key);
            let score = i32::from(direct) + i32::from(keyed);
            if score > best_score {
                best_score = score;
                best_idx = Some(idx);
            }
        }
        match best_idx {
            Some(idx) => order.push(remaining.remove(idx)),
            // every candidate would cross an outer boundary; keep input order
            // like the exhaustive search does when no permutation is valid
            None => order.append(&mut remaining),
        }
    }
    order
}
