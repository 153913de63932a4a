use std::collections::BTreeSet;

use dsq_common::QualifiedName;
use indexmap::IndexMap;

use crate::symbol::{collect_relation_names, combine_conjuncts, split_conjuncts, Symbol};

/// Set of relation names used as a dispatch key. Sorted so that two keys
/// built from the same relations in different order compare equal.
pub type RelationSet = BTreeSet<QualifiedName>;

/// Predicate fragments keyed by the set of relations they reference.
pub type SplitMap = IndexMap<RelationSet, Symbol>;

/// Split a predicate on its top-level AND into fragments keyed by
/// referenced-relation set.
///
/// Fragments landing on the same key are AND-combined. Disjunctions are
/// opaque: an `OR` spanning several relations stays one fragment keyed by
/// the union of its referents, because splitting across `OR` would change
/// the predicate's meaning.
pub fn split(symbol: &Symbol) -> SplitMap {
    let mut map = SplitMap::new();
    for fragment in split_conjuncts(symbol.clone()) {
        let key: RelationSet = collect_relation_names(&fragment).into_iter().collect();
        merge_fragment(&mut map, key, fragment);
    }
    map
}

/// Insert a fragment, AND-combining with an existing entry under the key.
/// A merged entry keeps its original position in the map.
pub fn merge_fragment(map: &mut SplitMap, key: RelationSet, fragment: Symbol) {
    match map.entry(key) {
        indexmap::map::Entry::Occupied(mut entry) => {
            let existing = entry.get().clone();
            entry.insert(combine_conjuncts(vec![existing, fragment]));
        }
        indexmap::map::Entry::Vacant(entry) => {
            entry.insert(fragment);
        }
    }
}
