//! Streaming correlation of LSIF elements
//!
//! A single pass over the dump populates the correlation state: documents,
//! ranges, result sets, definition/reference results, hovers, monikers,
//! package information, `next` chains, and the linked-moniker and
//! linked-reference-result equivalence classes. Elements are applied in
//! file order; the first error aborts the conversion.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use indexmap::IndexMap;
use tracing::debug;

use crate::convert::CancelFlag;
use crate::element::{
    DocumentData, DocumentPayload, Edge, Element, ElementType, MetaDataPayload, MonikerData,
    MonikerPayload, PackageInformationData, PackageInformationPayload, RangeData, RangePayload,
    ResultSetData, MONIKER_KIND_EXPORT, MONIKER_KIND_IMPORT,
};
use crate::error::{malformed_dump, ConvertError, Result};
use crate::hover::normalize_hover_payload;
use crate::id::Id;
use crate::sets::{DisjointIdSet, IdSet};

/// Mapping from document id to the set of range ids a result holds there.
pub type ResultData = BTreeMap<Id, IdSet>;

/// All data correlated from a dump. Ordered maps keep every later pass
/// deterministic; documents keep insertion order so the first document seen
/// for a URI can be chosen as canonical.
#[derive(Debug, Default)]
pub struct CorrelationState {
    pub dump_root: String,
    pub lsif_version: Option<String>,
    pub project_root: Option<String>,
    pub unsupported_vertexes: IdSet,
    pub document_data: IndexMap<Id, DocumentData>,
    pub range_data: BTreeMap<Id, RangeData>,
    pub result_set_data: BTreeMap<Id, ResultSetData>,
    pub definition_data: BTreeMap<Id, ResultData>,
    pub reference_data: BTreeMap<Id, ResultData>,
    pub hover_data: BTreeMap<Id, String>,
    pub moniker_data: BTreeMap<Id, MonikerData>,
    pub package_information_data: BTreeMap<Id, PackageInformationData>,
    pub next_data: BTreeMap<Id, Id>,
    pub imported_monikers: IdSet,
    pub exported_monikers: IdSet,
    pub linked_monikers: DisjointIdSet,
    pub linked_reference_results: DisjointIdSet,
}

impl CorrelationState {
    pub fn new(dump_root: &str) -> CorrelationState {
        let mut dump_root = dump_root.to_string();
        if !dump_root.is_empty() && !dump_root.ends_with('/') {
            dump_root.push('/');
        }

        CorrelationState {
            dump_root,
            ..CorrelationState::default()
        }
    }
}

/// Correlate a gzip-compressed, line-delimited dump from disk.
pub fn correlate(filename: &Path, dump_root: &str, cancel: &CancelFlag) -> Result<CorrelationState> {
    let file = File::open(filename)?;
    correlate_reader(file, dump_root, cancel)
}

/// Correlate a gzip-compressed dump from any reader.
pub fn correlate_reader<R: Read>(
    reader: R,
    dump_root: &str,
    cancel: &CancelFlag,
) -> Result<CorrelationState> {
    let mut state = CorrelationState::new(dump_root);
    let reader = BufReader::new(MultiGzDecoder::new(reader));

    for (index, line) in reader.lines().enumerate() {
        cancel.check()?;

        let line_number = index + 1;
        let line = line.map_err(|e| ConvertError::Input {
            line: line_number,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let element = Element::decode(&line, line_number)?;
        correlate_element(&mut state, &element, line_number)?;
    }

    if state.lsif_version.is_none() {
        return Err(ConvertError::MissingMetaData);
    }

    debug!(
        documents = state.document_data.len(),
        ranges = state.range_data.len(),
        result_sets = state.result_set_data.len(),
        "correlated dump"
    );

    Ok(state)
}

fn correlate_element(
    state: &mut CorrelationState,
    element: &Element,
    line: usize,
) -> Result<()> {
    match element.element_type {
        ElementType::Vertex => correlate_vertex(state, element, line),
        ElementType::Edge => correlate_edge(state, element, line),
    }
}

fn correlate_vertex(state: &mut CorrelationState, element: &Element, line: usize) -> Result<()> {
    match element.label.as_str() {
        "metaData" => correlate_meta_data(state, element, line),
        "document" => correlate_document(state, element, line),
        "range" => correlate_range(state, element, line),
        "resultSet" => correlate_result_set(state, element),
        "definitionResult" => correlate_definition_result(state, element),
        "referenceResult" => correlate_reference_result(state, element),
        "hoverResult" => correlate_hover_result(state, element, line),
        "moniker" => correlate_moniker(state, element, line),
        "packageInformation" => correlate_package_information(state, element, line),
        _ => {
            // Unknown vertexes are tolerated so newer indexers keep working;
            // edges referring to them are dropped later.
            state.unsupported_vertexes.add(element.id.clone());
            Ok(())
        }
    }
}

fn correlate_edge(state: &mut CorrelationState, element: &Element, line: usize) -> Result<()> {
    let handler = match element.label.as_str() {
        "contains" => correlate_contains_edge,
        "next" => correlate_next_edge,
        "item" => correlate_item_edge,
        "textDocument/definition" => correlate_definition_edge,
        "textDocument/references" => correlate_references_edge,
        "textDocument/hover" => correlate_hover_edge,
        "moniker" => correlate_moniker_edge,
        "nextMoniker" => correlate_next_moniker_edge,
        "packageInformation" => correlate_package_information_edge,
        // Unknown edge labels are ignored for forward compatibility.
        _ => return Ok(()),
    };

    let edge = Edge::decode(element, line)?;

    // Edges out of an unsupported vertex are dropped rather than rejected;
    // the vertex was tolerated, so its edges must be too.
    if state.unsupported_vertexes.contains(&edge.out_v) {
        debug!(edge = %element.id, "skipping edge from an unsupported vertex");
        return Ok(());
    }

    handler(state, &element.id, &edge)
}

fn correlate_meta_data(
    state: &mut CorrelationState,
    element: &Element,
    line: usize,
) -> Result<()> {
    let payload: MetaDataPayload = element.payload(line)?;

    let mut project_root = payload.project_root;
    if !project_root.ends_with('/') {
        project_root.push('/');
    }

    // The project root in the dump is either the root of the dump or the
    // root of the repository. Normalize to the former by appending the dump
    // root when it is not already suffixed by it, so every later document
    // URI is stored relative to the dump root.
    if !state.dump_root.is_empty() && !project_root.ends_with(&state.dump_root) {
        project_root.push_str(&state.dump_root);
    }

    state.lsif_version = Some(payload.version);
    state.project_root = Some(project_root);
    Ok(())
}

fn correlate_document(
    state: &mut CorrelationState,
    element: &Element,
    line: usize,
) -> Result<()> {
    let project_root = state
        .project_root
        .as_ref()
        .ok_or(ConvertError::MissingMetaData)?;

    let payload: DocumentPayload = element.payload(line)?;

    let uri = payload
        .uri
        .strip_prefix(project_root)
        .ok_or_else(|| ConvertError::PathEscape {
            uri: payload.uri.clone(),
            project_root: project_root.clone(),
        })?
        .to_string();

    state.document_data.insert(
        element.id.clone(),
        DocumentData {
            uri,
            contains: IdSet::new(),
        },
    );
    Ok(())
}

fn correlate_range(state: &mut CorrelationState, element: &Element, line: usize) -> Result<()> {
    let payload: RangePayload = element.payload(line)?;
    state
        .range_data
        .insert(element.id.clone(), RangeData::from_payload(payload));
    Ok(())
}

fn correlate_result_set(state: &mut CorrelationState, element: &Element) -> Result<()> {
    state
        .result_set_data
        .insert(element.id.clone(), ResultSetData::default());
    Ok(())
}

fn correlate_definition_result(state: &mut CorrelationState, element: &Element) -> Result<()> {
    state
        .definition_data
        .insert(element.id.clone(), ResultData::new());
    Ok(())
}

fn correlate_reference_result(state: &mut CorrelationState, element: &Element) -> Result<()> {
    state
        .reference_data
        .insert(element.id.clone(), ResultData::new());
    Ok(())
}

fn correlate_hover_result(
    state: &mut CorrelationState,
    element: &Element,
    line: usize,
) -> Result<()> {
    let payload: serde_json::Value = element.payload(line)?;
    state
        .hover_data
        .insert(element.id.clone(), normalize_hover_payload(&payload));
    Ok(())
}

fn correlate_moniker(state: &mut CorrelationState, element: &Element, line: usize) -> Result<()> {
    let payload: MonikerPayload = element.payload(line)?;
    state
        .moniker_data
        .insert(element.id.clone(), MonikerData::from_payload(payload));
    Ok(())
}

fn correlate_package_information(
    state: &mut CorrelationState,
    element: &Element,
    line: usize,
) -> Result<()> {
    let payload: PackageInformationPayload = element.payload(line)?;
    state.package_information_data.insert(
        element.id.clone(),
        PackageInformationData {
            name: payload.name,
            version: payload.version,
        },
    );
    Ok(())
}

fn correlate_contains_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    // Contains edges can also appear at project scope; those are not tracked.
    if !state.document_data.contains_key(&edge.out_v) {
        return Ok(());
    }

    for in_v in &edge.in_vs {
        if !state.range_data.contains_key(in_v) {
            return Err(malformed_dump(id.as_str(), in_v.as_str(), &["range"]));
        }
    }

    if let Some(document) = state.document_data.get_mut(&edge.out_v) {
        for in_v in &edge.in_vs {
            document.contains.add(in_v.clone());
        }
    }
    Ok(())
}

fn correlate_next_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    if !state.range_data.contains_key(&edge.out_v)
        && !state.result_set_data.contains_key(&edge.out_v)
    {
        return Err(malformed_dump(
            id.as_str(),
            edge.out_v.as_str(),
            &["range", "resultSet"],
        ));
    }

    let in_v = single_target(id, edge, &["resultSet"])?;
    if !state.result_set_data.contains_key(in_v) {
        return Err(malformed_dump(id.as_str(), in_v.as_str(), &["resultSet"]));
    }

    state.next_data.insert(edge.out_v.clone(), in_v.clone());
    Ok(())
}

fn correlate_item_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    let document = edge
        .document
        .clone()
        .ok_or_else(|| malformed_dump(id.as_str(), "", &["document"]))?;

    if state.definition_data.contains_key(&edge.out_v) {
        for in_v in &edge.in_vs {
            if !state.range_data.contains_key(in_v) {
                return Err(malformed_dump(id.as_str(), in_v.as_str(), &["range"]));
            }
        }

        if !edge.in_vs.is_empty() {
            if let Some(document_map) = state.definition_data.get_mut(&edge.out_v) {
                let range_ids = document_map.entry(document).or_default();
                for in_v in &edge.in_vs {
                    range_ids.add(in_v.clone());
                }
            }
        }
        return Ok(());
    }

    if state.reference_data.contains_key(&edge.out_v) {
        for in_v in &edge.in_vs {
            if state.reference_data.contains_key(in_v) {
                // An item edge between two reference results links them into
                // one logical result, collapsed during canonicalization.
                state.linked_reference_results.union(&edge.out_v, in_v);
            } else if !state.range_data.contains_key(in_v) {
                return Err(malformed_dump(id.as_str(), in_v.as_str(), &["range"]));
            }
        }

        let range_in_vs: Vec<Id> = edge
            .in_vs
            .iter()
            .filter(|in_v| state.range_data.contains_key(*in_v))
            .cloned()
            .collect();
        if !range_in_vs.is_empty() {
            if let Some(document_map) = state.reference_data.get_mut(&edge.out_v) {
                let range_ids = document_map.entry(document).or_default();
                for in_v in range_in_vs {
                    range_ids.add(in_v);
                }
            }
        }
        return Ok(());
    }

    Err(malformed_dump(id.as_str(), edge.out_v.as_str(), &["vertex"]))
}

fn correlate_definition_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    let in_v = single_target(id, edge, &["definitionResult"])?.clone();
    if !state.definition_data.contains_key(&in_v) {
        return Err(malformed_dump(
            id.as_str(),
            in_v.as_str(),
            &["definitionResult"],
        ));
    }

    if let Some(range) = state.range_data.get_mut(&edge.out_v) {
        range.definition_result_id = Some(in_v);
    } else if let Some(result_set) = state.result_set_data.get_mut(&edge.out_v) {
        result_set.definition_result_id = Some(in_v);
    } else {
        return Err(malformed_dump(
            id.as_str(),
            edge.out_v.as_str(),
            &["range", "resultSet"],
        ));
    }
    Ok(())
}

fn correlate_references_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    let in_v = single_target(id, edge, &["referenceResult"])?.clone();
    if !state.reference_data.contains_key(&in_v) {
        return Err(malformed_dump(
            id.as_str(),
            in_v.as_str(),
            &["referenceResult"],
        ));
    }

    if let Some(range) = state.range_data.get_mut(&edge.out_v) {
        range.reference_result_id = Some(in_v);
    } else if let Some(result_set) = state.result_set_data.get_mut(&edge.out_v) {
        result_set.reference_result_id = Some(in_v);
    } else {
        return Err(malformed_dump(
            id.as_str(),
            edge.out_v.as_str(),
            &["range", "resultSet"],
        ));
    }
    Ok(())
}

fn correlate_hover_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    let in_v = single_target(id, edge, &["hoverResult"])?.clone();
    if !state.hover_data.contains_key(&in_v) {
        return Err(malformed_dump(id.as_str(), in_v.as_str(), &["hoverResult"]));
    }

    if let Some(range) = state.range_data.get_mut(&edge.out_v) {
        range.hover_result_id = Some(in_v);
    } else if let Some(result_set) = state.result_set_data.get_mut(&edge.out_v) {
        result_set.hover_result_id = Some(in_v);
    } else {
        return Err(malformed_dump(
            id.as_str(),
            edge.out_v.as_str(),
            &["range", "resultSet"],
        ));
    }
    Ok(())
}

fn correlate_moniker_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    let in_v = single_target(id, edge, &["moniker"])?.clone();
    if !state.moniker_data.contains_key(&in_v) {
        return Err(malformed_dump(id.as_str(), in_v.as_str(), &["moniker"]));
    }

    if let Some(range) = state.range_data.get_mut(&edge.out_v) {
        range.moniker_ids = IdSet::singleton(in_v);
    } else if let Some(result_set) = state.result_set_data.get_mut(&edge.out_v) {
        result_set.moniker_ids = IdSet::singleton(in_v);
    } else {
        return Err(malformed_dump(
            id.as_str(),
            edge.out_v.as_str(),
            &["range", "resultSet"],
        ));
    }
    Ok(())
}

fn correlate_next_moniker_edge(state: &mut CorrelationState, id: &Id, edge: &Edge) -> Result<()> {
    let in_v = single_target(id, edge, &["moniker"])?;
    if !state.moniker_data.contains_key(in_v) {
        return Err(malformed_dump(id.as_str(), in_v.as_str(), &["moniker"]));
    }
    if !state.moniker_data.contains_key(&edge.out_v) {
        return Err(malformed_dump(id.as_str(), edge.out_v.as_str(), &["moniker"]));
    }

    state.linked_monikers.union(in_v, &edge.out_v);
    Ok(())
}

fn correlate_package_information_edge(
    state: &mut CorrelationState,
    id: &Id,
    edge: &Edge,
) -> Result<()> {
    let in_v = single_target(id, edge, &["packageInformation"])?.clone();
    if !state.package_information_data.contains_key(&in_v) {
        return Err(malformed_dump(
            id.as_str(),
            in_v.as_str(),
            &["packageInformation"],
        ));
    }

    let moniker = state
        .moniker_data
        .get_mut(&edge.out_v)
        .ok_or_else(|| malformed_dump(id.as_str(), edge.out_v.as_str(), &["moniker"]))?;

    moniker.package_information_id = Some(in_v);

    match moniker.kind.as_str() {
        MONIKER_KIND_IMPORT => state.imported_monikers.add(edge.out_v.clone()),
        MONIKER_KIND_EXPORT => state.exported_monikers.add(edge.out_v.clone()),
        _ => {}
    }
    Ok(())
}

fn single_target<'a>(id: &Id, edge: &'a Edge, kinds: &[&'static str]) -> Result<&'a Id> {
    edge.first_in_v()
        .ok_or_else(|| malformed_dump(id.as_str(), "", kinds))
}
