//! Canonicalization of correlated dump data
//!
//! Four ordered passes collapse the logical structure of the graph: merge
//! documents sharing a URI, collapse linked reference results, fold result
//! set chains into the ranges and result sets that reach them, and replace
//! per-item moniker sets with their linked non-local equivalence classes.
//! Afterwards no `next` data remains and every pass is a no-op if re-run.

use std::collections::BTreeMap;

use tracing::debug;

use crate::correlate::{CorrelationState, ResultData};
use crate::element::ResultSetData;
use crate::id::Id;
use crate::sets::IdSet;

pub fn canonicalize(state: &mut CorrelationState) {
    // Some indexers (such as lsif-tsc) index dependent projects into the
    // same dump as the target project, defining multiple documents with the
    // same URI. The first document seen for a URI becomes the canonical one
    // and absorbs the contains, definition, and reference data of the rest.
    merge_documents(state);

    // Reference results linked via item edges form one logical result.
    // Merge each equivalence class into its canonical member and remap all
    // identifiers to it.
    canonicalize_reference_results(state);

    // Collapse result set chains into the items that can reach them. The
    // rest of the conversion ignores `next` edges entirely.
    canonicalize_result_sets(state);
    canonicalize_ranges(state);

    // Replace every moniker set with its linked, non-local expansion.
    aggregate_monikers(state);

    debug!(
        documents = state.document_data.len(),
        reference_results = state.reference_data.len(),
        "canonicalized dump"
    );
}

/// Merge the data of all documents that share a URI into the first document
/// inserted for that URI, re-keying definition and reference entries and
/// removing the duplicate ids.
fn merge_documents(state: &mut CorrelationState) {
    let mut canonical_ids_by_uri: BTreeMap<String, Id> = BTreeMap::new();

    let document_ids: Vec<Id> = state.document_data.keys().cloned().collect();
    for document_id in document_ids {
        let uri = state.document_data[&document_id].uri.clone();

        let canonical_id = match canonical_ids_by_uri.get(&uri) {
            Some(canonical_id) => canonical_id.clone(),
            None => {
                canonical_ids_by_uri.insert(uri, document_id);
                continue;
            }
        };

        let Some(duplicate) = state.document_data.shift_remove(&document_id) else {
            continue;
        };
        if let Some(canonical) = state.document_data.get_mut(&canonical_id) {
            canonical.contains.extend(&duplicate.contains);
        }

        rekey_document(&mut state.definition_data, &document_id, &canonical_id);
        rekey_document(&mut state.reference_data, &document_id, &canonical_id);
    }
}

/// Move every occurrence of `from` as a document key to `canonical`,
/// unioning range sets on collision.
fn rekey_document(data: &mut BTreeMap<Id, ResultData>, from: &Id, canonical: &Id) {
    for document_map in data.values_mut() {
        if let Some(range_ids) = document_map.remove(from) {
            document_map
                .entry(canonical.clone())
                .or_default()
                .extend(&range_ids);
        }
    }
}

/// Choose the smallest member of each linked reference result class as its
/// canonical result, merge the others into it, and rewrite every pointer to
/// a class member through the canonical id.
fn canonicalize_reference_results(state: &mut CorrelationState) {
    let mut links: BTreeMap<Id, Id> = BTreeMap::new();

    let linked_ids: Vec<Id> = state.linked_reference_results.ids().cloned().collect();
    for reference_result_id in linked_ids {
        // Each extraction covers its whole class; skip members already seen.
        if links.contains_key(&reference_result_id) {
            continue;
        }

        // The extracted class always contains its seed, so the choice is
        // total; the smallest member wins for reproducibility.
        let class = state.linked_reference_results.extract_set(&reference_result_id);
        let Some(canonical_id) = class.choose().cloned() else {
            continue;
        };

        for linked_id in class.iter() {
            // The canonical id maps to itself so the duplicate check above
            // recognizes every member of a processed class.
            links.insert(linked_id.clone(), canonical_id.clone());
        }

        for linked_id in class.iter().filter(|linked_id| **linked_id != canonical_id) {
            let Some(moved) = state.reference_data.remove(linked_id) else {
                continue;
            };

            let canonical_map = state.reference_data.entry(canonical_id.clone()).or_default();
            for (document_id, range_ids) in moved {
                canonical_map
                    .entry(document_id)
                    .or_default()
                    .extend(&range_ids);
            }
        }
    }

    for range in state.range_data.values_mut() {
        if let Some(canonical_id) = range.reference_result_id.as_ref().and_then(|id| links.get(id))
        {
            range.reference_result_id = Some(canonical_id.clone());
        }
    }

    for result_set in state.result_set_data.values_mut() {
        if let Some(canonical_id) = result_set
            .reference_result_id
            .as_ref()
            .and_then(|id| links.get(id))
        {
            result_set.reference_result_id = Some(canonical_id.clone());
        }
    }
}

/// Fold every result set chain, depth first. Folding a node deletes its
/// `next` entry, which both memoizes the walk and leaves `next_data` empty
/// once ranges have been folded as well.
fn canonicalize_result_sets(state: &mut CorrelationState) {
    let result_set_ids: Vec<Id> = state.result_set_data.keys().cloned().collect();
    for result_set_id in result_set_ids {
        fold_result_set(state, &result_set_id);
    }
}

fn fold_result_set(state: &mut CorrelationState, id: &Id) {
    let Some(next_id) = state.next_data.get(id).cloned() else {
        return;
    };

    fold_result_set(state, &next_id);

    let next_item = state
        .result_set_data
        .get(&next_id)
        .cloned()
        .unwrap_or_default();
    if let Some(item) = state.result_set_data.get_mut(id) {
        adopt_next(item, &next_item);
    }

    state.next_data.remove(id);
}

/// Fold the (already canonicalized) result set each range points at into the
/// range itself. Ranges are never the target of a `next` edge, so one level
/// suffices.
fn canonicalize_ranges(state: &mut CorrelationState) {
    let range_ids: Vec<Id> = state.range_data.keys().cloned().collect();
    for range_id in range_ids {
        let Some(next_id) = state.next_data.remove(&range_id) else {
            continue;
        };

        let next_item = state
            .result_set_data
            .get(&next_id)
            .cloned()
            .unwrap_or_default();

        let Some(range) = state.range_data.get_mut(&range_id) else {
            continue;
        };
        if range.definition_result_id.is_none() {
            range.definition_result_id = next_item.definition_result_id.clone();
        }
        if range.reference_result_id.is_none() {
            range.reference_result_id = next_item.reference_result_id.clone();
        }
        if range.hover_result_id.is_none() {
            range.hover_result_id = next_item.hover_result_id.clone();
        }
        range.moniker_ids.extend(&next_item.moniker_ids);
    }
}

fn adopt_next(item: &mut ResultSetData, next_item: &ResultSetData) {
    if item.definition_result_id.is_none() {
        item.definition_result_id = next_item.definition_result_id.clone();
    }
    if item.reference_result_id.is_none() {
        item.reference_result_id = next_item.reference_result_id.clone();
    }
    if item.hover_result_id.is_none() {
        item.hover_result_id = next_item.hover_result_id.clone();
    }
    item.moniker_ids.extend(&next_item.moniker_ids);
}

/// Replace the moniker set of every range and result set with the linked
/// equivalence class reachable from one of its members, keeping only
/// non-local monikers.
fn aggregate_monikers(state: &mut CorrelationState) {
    let range_ids: Vec<Id> = state.range_data.keys().cloned().collect();
    for range_id in range_ids {
        let gathered = gather_monikers(state, &state.range_data[&range_id].moniker_ids);
        if let Some(range) = state.range_data.get_mut(&range_id) {
            range.moniker_ids = gathered;
        }
    }

    let result_set_ids: Vec<Id> = state.result_set_data.keys().cloned().collect();
    for result_set_id in result_set_ids {
        let gathered = gather_monikers(state, &state.result_set_data[&result_set_id].moniker_ids);
        if let Some(result_set) = state.result_set_data.get_mut(&result_set_id) {
            result_set.moniker_ids = gathered;
        }
    }
}

fn gather_monikers(state: &CorrelationState, source: &IdSet) -> IdSet {
    let mut monikers = IdSet::new();

    if let Some(candidate) = source.choose() {
        for moniker_id in state.linked_monikers.extract_set(candidate).iter() {
            if let Some(moniker) = state.moniker_data.get(moniker_id) {
                if !moniker.is_local() {
                    monikers.add(moniker_id.clone());
                }
            }
        }
    }

    monikers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{DocumentData, MonikerData, RangeData};

    fn id(s: &str) -> Id {
        Id::from(s)
    }

    fn range() -> RangeData {
        RangeData::default()
    }

    fn moniker(kind: &str) -> MonikerData {
        MonikerData {
            kind: kind.to_string(),
            scheme: "test".to_string(),
            identifier: "sym".to_string(),
            package_information_id: None,
        }
    }

    fn document(uri: &str, contains: &[&str]) -> DocumentData {
        DocumentData {
            uri: uri.to_string(),
            contains: contains.iter().map(|s| id(s)).collect(),
        }
    }

    #[test]
    fn merges_documents_sharing_a_uri() {
        let mut state = CorrelationState::new("");
        state.document_data.insert(id("d1"), document("a.go", &["r1"]));
        state.document_data.insert(id("d2"), document("a.go", &["r2"]));
        state
            .definition_data
            .entry(id("def"))
            .or_default()
            .insert(id("d2"), IdSet::singleton(id("r2")));

        merge_documents(&mut state);

        assert_eq!(state.document_data.len(), 1);
        let canonical = &state.document_data[&id("d1")];
        assert!(canonical.contains.contains(&id("r1")));
        assert!(canonical.contains.contains(&id("r2")));

        let defs = &state.definition_data[&id("def")];
        assert!(defs.contains_key(&id("d1")));
        assert!(!defs.contains_key(&id("d2")));
    }

    #[test]
    fn first_document_seen_is_canonical() {
        let mut state = CorrelationState::new("");
        state.document_data.insert(id("z9"), document("a.go", &[]));
        state.document_data.insert(id("a1"), document("a.go", &[]));

        merge_documents(&mut state);

        assert!(state.document_data.contains_key(&id("z9")));
        assert!(!state.document_data.contains_key(&id("a1")));
    }

    #[test]
    fn collapses_linked_reference_results() {
        let mut state = CorrelationState::new("");
        state
            .reference_data
            .entry(id("r2"))
            .or_default()
            .insert(id("d1"), IdSet::singleton(id("x")));
        state
            .reference_data
            .entry(id("r1"))
            .or_default()
            .insert(id("d2"), IdSet::singleton(id("y")));
        state.linked_reference_results.union(&id("r2"), &id("r1"));

        let mut range = range();
        range.reference_result_id = Some(id("r2"));
        state.range_data.insert(id("x"), range);

        canonicalize_reference_results(&mut state);

        // r1 is the lexicographically smallest member, so it survives.
        assert!(state.reference_data.contains_key(&id("r1")));
        assert!(!state.reference_data.contains_key(&id("r2")));
        let merged = &state.reference_data[&id("r1")];
        assert!(merged.contains_key(&id("d1")));
        assert!(merged.contains_key(&id("d2")));

        assert_eq!(state.range_data[&id("x")].reference_result_id, Some(id("r1")));
    }

    #[test]
    fn unlinked_reference_results_are_untouched() {
        let mut state = CorrelationState::new("");
        state
            .reference_data
            .entry(id("solo"))
            .or_default()
            .insert(id("d1"), IdSet::singleton(id("x")));

        let mut range = range();
        range.reference_result_id = Some(id("solo"));
        state.range_data.insert(id("x"), range);

        canonicalize_reference_results(&mut state);

        assert!(state.reference_data.contains_key(&id("solo")));
        assert_eq!(state.range_data[&id("x")].reference_result_id, Some(id("solo")));
    }

    #[test]
    fn folds_result_set_chains_and_clears_next_data() {
        let mut state = CorrelationState::new("");
        state.range_data.insert(id("r"), range());
        state
            .result_set_data
            .insert(id("rs1"), ResultSetData::default());
        let mut rs2 = ResultSetData::default();
        rs2.hover_result_id = Some(id("h"));
        rs2.definition_result_id = Some(id("def"));
        state.result_set_data.insert(id("rs2"), rs2);

        state.next_data.insert(id("r"), id("rs1"));
        state.next_data.insert(id("rs1"), id("rs2"));

        canonicalize_result_sets(&mut state);
        canonicalize_ranges(&mut state);

        assert!(state.next_data.is_empty());
        assert_eq!(state.range_data[&id("r")].hover_result_id, Some(id("h")));
        assert_eq!(
            state.range_data[&id("r")].definition_result_id,
            Some(id("def"))
        );
    }

    #[test]
    fn folding_does_not_override_own_results() {
        let mut state = CorrelationState::new("");
        let mut r = range();
        r.hover_result_id = Some(id("own"));
        state.range_data.insert(id("r"), r);

        let mut rs = ResultSetData::default();
        rs.hover_result_id = Some(id("inherited"));
        state.result_set_data.insert(id("rs"), rs);
        state.next_data.insert(id("r"), id("rs"));

        canonicalize_ranges(&mut state);

        assert_eq!(state.range_data[&id("r")].hover_result_id, Some(id("own")));
    }

    #[test]
    fn aggregation_expands_links_and_drops_local_monikers() {
        let mut state = CorrelationState::new("");
        state.moniker_data.insert(id("m1"), moniker("local"));
        state.moniker_data.insert(id("m2"), moniker("export"));
        state.moniker_data.insert(id("m3"), moniker("import"));
        state.linked_monikers.union(&id("m1"), &id("m2"));
        state.linked_monikers.union(&id("m2"), &id("m3"));

        let mut r = range();
        r.moniker_ids = IdSet::singleton(id("m1"));
        state.range_data.insert(id("r"), r);

        aggregate_monikers(&mut state);

        let moniker_ids = &state.range_data[&id("r")].moniker_ids;
        assert!(!moniker_ids.contains(&id("m1")));
        assert!(moniker_ids.contains(&id("m2")));
        assert!(moniker_ids.contains(&id("m3")));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let mut state = CorrelationState::new("");
        state.document_data.insert(id("d1"), document("a.go", &["x"]));
        state.document_data.insert(id("d2"), document("a.go", &["y"]));

        state
            .reference_data
            .entry(id("r1"))
            .or_default()
            .insert(id("d1"), IdSet::singleton(id("x")));
        state.reference_data.entry(id("r2")).or_default();
        state.linked_reference_results.union(&id("r1"), &id("r2"));

        state.moniker_data.insert(id("m1"), moniker("local"));
        state.moniker_data.insert(id("m2"), moniker("export"));
        state.linked_monikers.union(&id("m1"), &id("m2"));

        let mut r = range();
        r.moniker_ids = IdSet::singleton(id("m1"));
        r.reference_result_id = Some(id("r2"));
        state.range_data.insert(id("x"), r);
        state.range_data.insert(id("y"), range());

        let mut rs = ResultSetData::default();
        rs.hover_result_id = Some(id("h"));
        state.result_set_data.insert(id("rs"), rs);
        state.next_data.insert(id("x"), id("rs"));

        canonicalize(&mut state);
        let documents_once: Vec<Id> = state.document_data.keys().cloned().collect();
        let ranges_once = state.range_data.clone();
        let references_once = state.reference_data.clone();

        canonicalize(&mut state);
        let documents_twice: Vec<Id> = state.document_data.keys().cloned().collect();

        assert_eq!(documents_once, documents_twice);
        assert_eq!(ranges_once, state.range_data);
        assert_eq!(references_once, state.reference_data);
        assert!(state.next_data.is_empty());
    }
}
