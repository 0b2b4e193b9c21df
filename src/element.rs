//! Wire-format decoding for LSIF elements
//!
//! Each line of a dump is one element: a vertex or an edge with a label and
//! a label-specific payload. The envelope is decoded once; the raw line is
//! retained so label handlers can run a secondary decode against the fields
//! they care about.

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::id::Id;
use crate::sets::IdSet;

/// A decoded element envelope. `raw` is the full input line.
#[derive(Debug, Clone)]
pub struct Element {
    pub id: Id,
    pub element_type: ElementType,
    pub label: String,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Vertex,
    Edge,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Id,
    #[serde(rename = "type")]
    element_type: ElementType,
    #[serde(default)]
    label: String,
}

impl Element {
    /// Decode the envelope of one input line. `line_number` is 1-based and
    /// only used for error reporting.
    pub fn decode(line: &str, line_number: usize) -> Result<Element> {
        let envelope: Envelope =
            serde_json::from_str(line).map_err(|e| ConvertError::Input {
                line: line_number,
                message: e.to_string(),
            })?;

        Ok(Element {
            id: envelope.id,
            element_type: envelope.element_type,
            label: envelope.label,
            raw: line.to_string(),
        })
    }

    /// Run a secondary decode of the payload against a label-specific shape.
    pub fn payload<'a, T: Deserialize<'a>>(&'a self, line_number: usize) -> Result<T> {
        serde_json::from_str(&self.raw).map_err(|e| ConvertError::Input {
            line: line_number,
            message: e.to_string(),
        })
    }
}

/// A decoded edge. `in_vs` merges the singular `inV` and plural `inVs` wire
/// fields, preserving order.
#[derive(Debug, Clone)]
pub struct Edge {
    pub out_v: Id,
    pub in_vs: Vec<Id>,
    pub document: Option<Id>,
}

#[derive(Debug, Deserialize)]
struct EdgePayload {
    #[serde(rename = "outV")]
    out_v: Id,
    #[serde(rename = "inV")]
    in_v: Option<Id>,
    #[serde(rename = "inVs", default)]
    in_vs: Vec<Id>,
    document: Option<Id>,
}

impl Edge {
    pub fn decode(element: &Element, line_number: usize) -> Result<Edge> {
        let payload: EdgePayload = element.payload(line_number)?;

        let mut in_vs = Vec::with_capacity(payload.in_vs.len() + 1);
        in_vs.extend(payload.in_v);
        in_vs.extend(payload.in_vs);

        Ok(Edge {
            out_v: payload.out_v,
            in_vs,
            document: payload.document,
        })
    }

    /// The first target vertex. Edges with neither `inV` nor `inVs` are
    /// malformed; callers report them against the edge id.
    pub fn first_in_v(&self) -> Option<&Id> {
        self.in_vs.first()
    }
}

/// `metaData` vertex payload.
#[derive(Debug, Deserialize)]
pub struct MetaDataPayload {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "projectRoot", default)]
    pub project_root: String,
}

/// `document` vertex payload.
#[derive(Debug, Deserialize)]
pub struct DocumentPayload {
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub character: u32,
}

/// `range` vertex payload.
#[derive(Debug, Deserialize)]
pub struct RangePayload {
    #[serde(default)]
    pub start: Position,
    #[serde(default)]
    pub end: Position,
}

/// `moniker` vertex payload.
#[derive(Debug, Deserialize)]
pub struct MonikerPayload {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub identifier: String,
}

/// `packageInformation` vertex payload.
#[derive(Debug, Deserialize)]
pub struct PackageInformationPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A document and the ranges it contains. The URI is relative to the dump
/// root once the correlator has stripped the project root prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentData {
    pub uri: String,
    pub contains: IdSet,
}

/// A range with the result identifiers reachable from it. Serialized into
/// the per-document bundle blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeData {
    pub start_line: u32,
    pub start_character: u32,
    pub end_line: u32,
    pub end_character: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_result_id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_result_id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover_result_id: Option<Id>,
    pub moniker_ids: IdSet,
}

impl RangeData {
    pub fn from_payload(payload: RangePayload) -> RangeData {
        RangeData {
            start_line: payload.start.line,
            start_character: payload.start.character,
            end_line: payload.end.line,
            end_character: payload.end.character,
            ..RangeData::default()
        }
    }
}

/// A result set: the shareable portion of a range, reached via `next` edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSetData {
    pub definition_result_id: Option<Id>,
    pub reference_result_id: Option<Id>,
    pub hover_result_id: Option<Id>,
    pub moniker_ids: IdSet,
}

pub const MONIKER_KIND_LOCAL: &str = "local";
pub const MONIKER_KIND_IMPORT: &str = "import";
pub const MONIKER_KIND_EXPORT: &str = "export";

/// A cross-index symbol identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonikerData {
    pub kind: String,
    pub scheme: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_information_id: Option<Id>,
}

impl MonikerData {
    pub fn from_payload(payload: MonikerPayload) -> MonikerData {
        let kind = if payload.kind.is_empty() {
            MONIKER_KIND_LOCAL.to_string()
        } else {
            payload.kind
        };

        MonikerData {
            kind,
            scheme: payload.scheme,
            identifier: payload.identifier,
            package_information_id: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind == MONIKER_KIND_LOCAL
    }
}

/// The package a non-local moniker belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInformationData {
    pub name: String,
    pub version: String,
}
