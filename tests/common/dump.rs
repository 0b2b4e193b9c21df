//! Builder for gzip-compressed LSIF dumps

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

/// Assembles a line-delimited LSIF dump element by element.
pub struct DumpBuilder {
    lines: Vec<String>,
    next_edge_id: usize,
}

impl Default for DumpBuilder {
    fn default() -> Self {
        DumpBuilder::new()
    }
}

impl DumpBuilder {
    pub fn new() -> DumpBuilder {
        DumpBuilder {
            lines: Vec::new(),
            next_edge_id: 10_000,
        }
    }

    /// Append a raw element.
    pub fn push(&mut self, value: Value) -> &mut Self {
        self.lines.push(value.to_string());
        self
    }

    /// Append a raw, possibly invalid line.
    pub fn push_raw(&mut self, line: &str) -> &mut Self {
        self.lines.push(line.to_string());
        self
    }

    fn edge_id(&mut self) -> usize {
        self.next_edge_id += 1;
        self.next_edge_id
    }

    pub fn meta_data(&mut self, project_root: &str) -> &mut Self {
        self.push(json!({
            "id": 1, "type": "vertex", "label": "metaData",
            "version": "0.4.3", "projectRoot": project_root,
        }))
    }

    pub fn document(&mut self, id: usize, uri: &str) -> &mut Self {
        self.push(json!({"id": id, "type": "vertex", "label": "document", "uri": uri}))
    }

    pub fn range(&mut self, id: usize, start: (u32, u32), end: (u32, u32)) -> &mut Self {
        self.push(json!({
            "id": id, "type": "vertex", "label": "range",
            "start": {"line": start.0, "character": start.1},
            "end": {"line": end.0, "character": end.1},
        }))
    }

    pub fn result_set(&mut self, id: usize) -> &mut Self {
        self.push(json!({"id": id, "type": "vertex", "label": "resultSet"}))
    }

    pub fn definition_result(&mut self, id: usize) -> &mut Self {
        self.push(json!({"id": id, "type": "vertex", "label": "definitionResult"}))
    }

    pub fn reference_result(&mut self, id: usize) -> &mut Self {
        self.push(json!({"id": id, "type": "vertex", "label": "referenceResult"}))
    }

    pub fn hover_result(&mut self, id: usize, text: &str) -> &mut Self {
        self.push(json!({
            "id": id, "type": "vertex", "label": "hoverResult",
            "result": {"contents": text},
        }))
    }

    pub fn moniker(&mut self, id: usize, kind: &str, scheme: &str, identifier: &str) -> &mut Self {
        self.push(json!({
            "id": id, "type": "vertex", "label": "moniker",
            "kind": kind, "scheme": scheme, "identifier": identifier,
        }))
    }

    pub fn package_information(&mut self, id: usize, name: &str, version: &str) -> &mut Self {
        self.push(json!({
            "id": id, "type": "vertex", "label": "packageInformation",
            "name": name, "version": version,
        }))
    }

    pub fn contains(&mut self, out_v: usize, in_vs: &[usize]) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "contains",
            "outV": out_v, "inVs": in_vs,
        }))
    }

    pub fn next(&mut self, out_v: usize, in_v: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "next",
            "outV": out_v, "inV": in_v,
        }))
    }

    pub fn item(&mut self, out_v: usize, in_vs: &[usize], document: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "item",
            "outV": out_v, "inVs": in_vs, "document": document,
        }))
    }

    pub fn definition_edge(&mut self, out_v: usize, in_v: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "textDocument/definition",
            "outV": out_v, "inV": in_v,
        }))
    }

    pub fn references_edge(&mut self, out_v: usize, in_v: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "textDocument/references",
            "outV": out_v, "inV": in_v,
        }))
    }

    pub fn hover_edge(&mut self, out_v: usize, in_v: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "textDocument/hover",
            "outV": out_v, "inV": in_v,
        }))
    }

    pub fn moniker_edge(&mut self, out_v: usize, in_v: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "moniker",
            "outV": out_v, "inV": in_v,
        }))
    }

    pub fn next_moniker(&mut self, out_v: usize, in_v: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "nextMoniker",
            "outV": out_v, "inV": in_v,
        }))
    }

    pub fn package_information_edge(&mut self, out_v: usize, in_v: usize) -> &mut Self {
        let id = self.edge_id();
        self.push(json!({
            "id": id, "type": "edge", "label": "packageInformation",
            "outV": out_v, "inV": in_v,
        }))
    }

    /// Gzip the assembled dump to a file.
    pub fn write_to(&self, path: &Path) {
        let file = File::create(path).expect("dump file should be creatable");
        let mut encoder = GzEncoder::new(file, Compression::default());
        for line in &self.lines {
            encoder
                .write_all(line.as_bytes())
                .expect("dump line should write");
            encoder.write_all(b"\n").expect("dump line should write");
        }
        encoder.finish().expect("dump should flush");
    }
}
