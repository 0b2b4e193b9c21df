//! Bundle materialization
//!
//! Writes the canonicalized, pruned correlation state into a single SQLite
//! file with five tables: metadata, documents, resultChunks, definitions,
//! and references. Document and result-chunk payloads are stored as
//! gzip-compressed JSON blobs keyed the way the query server expects.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::convert::CancelFlag;
use crate::correlate::{CorrelationState, ResultData};
use crate::element::{MonikerData, PackageInformationData, RangeData};
use crate::error::Result;
use crate::id::Id;
use crate::sets::IdSet;

pub const MAX_NUM_RESULT_CHUNKS: usize = 1000;
pub const RESULTS_PER_RESULT_CHUNK: usize = 500;
pub const INTERNAL_VERSION: &str = "0.1.0";

use crate::inserter::BatchInserter;

/// Hash an identifier into `[0, max_index)`.
///
/// A Java-style string hash over UTF-16 code units with wrapping 32-bit
/// arithmetic. Readers locate result chunks with this exact function, so it
/// must stay bit-identical to the implementation existing bundles were
/// written with; changing it makes every bundle unreadable.
pub fn hash_key(id: &Id, max_index: usize) -> usize {
    let mut hash: i32 = 0;
    for unit in id.as_str().encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }

    if hash < 0 {
        hash = hash.wrapping_neg();
    }

    (i64::from(hash)).rem_euclid(max_index as i64) as usize
}

/// Serialize to JSON and gzip the result.
fn gzip_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value).map_err(std::io::Error::other)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Write the bundle for a converted dump to `filename`.
pub fn write(state: &CorrelationState, filename: &Path, cancel: &CancelFlag) -> Result<()> {
    if filename.exists() {
        std::fs::remove_file(filename)?;
    }

    let conn = Connection::open(filename)?;
    create_schema(&conn)?;

    let num_results = state.definition_data.len() + state.reference_data.len();
    let num_result_chunks = (num_results / RESULTS_PER_RESULT_CHUNK)
        .clamp(1, MAX_NUM_RESULT_CHUNKS);

    cancel.check()?;
    populate_metadata_table(state, num_result_chunks, &conn)?;
    populate_documents_table(state, &conn, cancel)?;
    populate_result_chunks_table(state, num_result_chunks, &conn, cancel)?;
    populate_definitions_table(state, &conn, cancel)?;
    populate_references_table(state, &conn, cancel)?;

    debug!(
        path = %filename.display(),
        result_chunks = num_result_chunks,
        "wrote bundle"
    );
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE metadata (
            id INTEGER PRIMARY KEY,
            lsifVersion TEXT,
            sourcegraphVersion TEXT,
            numResultChunks INTEGER
        );

        CREATE TABLE documents (
            path TEXT PRIMARY KEY,
            data BLOB
        );

        CREATE TABLE resultChunks (
            id INTEGER PRIMARY KEY,
            data BLOB
        );

        CREATE TABLE definitions (
            scheme TEXT,
            identifier TEXT,
            documentPath TEXT,
            startLine INTEGER,
            endLine INTEGER,
            startCharacter INTEGER,
            endCharacter INTEGER
        );

        CREATE TABLE "references" (
            scheme TEXT,
            identifier TEXT,
            documentPath TEXT,
            startLine INTEGER,
            endLine INTEGER,
            startCharacter INTEGER,
            endCharacter INTEGER
        );
        "#,
    )?;
    Ok(())
}

fn populate_metadata_table(
    state: &CorrelationState,
    num_result_chunks: usize,
    conn: &Connection,
) -> Result<()> {
    let mut inserter = BatchInserter::new(
        conn,
        "metadata",
        &["id", "lsifVersion", "sourcegraphVersion", "numResultChunks"],
    );
    inserter.insert(vec![
        Value::Integer(1),
        Value::Text(state.lsif_version.clone().unwrap_or_default()),
        Value::Text(INTERNAL_VERSION.to_string()),
        Value::Integer(num_result_chunks as i64),
    ])?;
    inserter.flush()
}

/// The per-document blob: every range the document contains plus the hover,
/// moniker, and package data reachable from those ranges.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentBlob<'a> {
    ranges: BTreeMap<&'a Id, &'a RangeData>,
    hover_results: BTreeMap<&'a Id, &'a str>,
    monikers: BTreeMap<&'a Id, &'a MonikerData>,
    package_information: BTreeMap<&'a Id, &'a PackageInformationData>,
}

fn populate_documents_table(
    state: &CorrelationState,
    conn: &Connection,
    cancel: &CancelFlag,
) -> Result<()> {
    let mut inserter = BatchInserter::new(conn, "documents", &["path", "data"]);

    for document in state.document_data.values() {
        cancel.check()?;

        // Paths escaping the dump root are never queryable.
        if document.uri.starts_with("..") {
            continue;
        }

        let mut blob = DocumentBlob {
            ranges: BTreeMap::new(),
            hover_results: BTreeMap::new(),
            monikers: BTreeMap::new(),
            package_information: BTreeMap::new(),
        };

        for range_id in document.contains.iter() {
            let Some(range) = state.range_data.get(range_id) else {
                continue;
            };
            blob.ranges.insert(range_id, range);

            if let Some(hover_result_id) = &range.hover_result_id {
                if let Some(hover) = state.hover_data.get(hover_result_id) {
                    blob.hover_results.insert(hover_result_id, hover.as_str());
                }
            }

            for moniker_id in range.moniker_ids.iter() {
                let Some(moniker) = state.moniker_data.get(moniker_id) else {
                    continue;
                };
                blob.monikers.insert(moniker_id, moniker);

                if let Some(package_information_id) = &moniker.package_information_id {
                    if let Some(package_information) =
                        state.package_information_data.get(package_information_id)
                    {
                        blob.package_information
                            .insert(package_information_id, package_information);
                    }
                }
            }
        }

        inserter.insert(vec![
            Value::Text(document.uri.clone()),
            Value::Blob(gzip_json(&blob)?),
        ])?;
    }

    inserter.flush()
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ResultChunk {
    paths: BTreeMap<Id, String>,
    document_id_range_ids: BTreeMap<Id, Vec<DocumentIdRangeId>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentIdRangeId {
    document_id: Id,
    range_id: Id,
}

fn populate_result_chunks_table(
    state: &CorrelationState,
    num_result_chunks: usize,
    conn: &Connection,
    cancel: &CancelFlag,
) -> Result<()> {
    let mut result_chunks: Vec<ResultChunk> = Vec::new();
    result_chunks.resize_with(num_result_chunks, ResultChunk::default);

    add_to_chunks(state, &mut result_chunks, &state.definition_data);
    add_to_chunks(state, &mut result_chunks, &state.reference_data);

    let mut inserter = BatchInserter::new(conn, "resultChunks", &["id", "data"]);
    for (chunk_id, result_chunk) in result_chunks.iter().enumerate() {
        cancel.check()?;

        if result_chunk.paths.is_empty() && result_chunk.document_id_range_ids.is_empty() {
            continue;
        }

        inserter.insert(vec![
            Value::Integer(chunk_id as i64),
            Value::Blob(gzip_json(result_chunk)?),
        ])?;
    }

    inserter.flush()
}

fn add_to_chunks(
    state: &CorrelationState,
    result_chunks: &mut [ResultChunk],
    data: &BTreeMap<Id, ResultData>,
) {
    for (result_id, document_ranges) in data {
        let result_chunk = &mut result_chunks[hash_key(result_id, result_chunks.len())];

        for (document_id, range_ids) in document_ranges {
            // Documents removed by merging or pruning have no path to
            // resolve against; their entries are dropped.
            let Some(document) = state.document_data.get(document_id) else {
                continue;
            };

            for range_id in range_ids.iter() {
                result_chunk
                    .document_id_range_ids
                    .entry(result_id.clone())
                    .or_default()
                    .push(DocumentIdRangeId {
                        document_id: document_id.clone(),
                        range_id: range_id.clone(),
                    });
            }
            result_chunk
                .paths
                .insert(document_id.clone(), document.uri.clone());
        }
    }
}

fn populate_definitions_table(
    state: &CorrelationState,
    conn: &Connection,
    cancel: &CancelFlag,
) -> Result<()> {
    // Correlate monikers through the ranges that own a definition result.
    // This keeps the table deduplicated and avoids a second sweep over the
    // range data, by far the largest portion of a dump.
    let mut definition_monikers: BTreeMap<&Id, IdSet> = BTreeMap::new();
    for range in state.range_data.values() {
        if let Some(definition_result_id) = &range.definition_result_id {
            if !range.moniker_ids.is_empty() {
                definition_monikers
                    .entry(definition_result_id)
                    .or_default()
                    .extend(&range.moniker_ids);
            }
        }
    }

    let mut inserter = BatchInserter::new(conn, "definitions", MONIKER_RANGE_COLUMNS);
    insert_moniker_ranges(
        state,
        &state.definition_data,
        &definition_monikers,
        &mut inserter,
        cancel,
    )?;
    inserter.flush()
}

fn populate_references_table(
    state: &CorrelationState,
    conn: &Connection,
    cancel: &CancelFlag,
) -> Result<()> {
    let mut reference_monikers: BTreeMap<&Id, IdSet> = BTreeMap::new();
    for range in state.range_data.values() {
        if let Some(reference_result_id) = &range.reference_result_id {
            if !range.moniker_ids.is_empty() {
                reference_monikers
                    .entry(reference_result_id)
                    .or_default()
                    .extend(&range.moniker_ids);
            }
        }
    }

    let mut inserter = BatchInserter::new(conn, "\"references\"", MONIKER_RANGE_COLUMNS);
    insert_moniker_ranges(
        state,
        &state.reference_data,
        &reference_monikers,
        &mut inserter,
        cancel,
    )?;
    inserter.flush()
}

const MONIKER_RANGE_COLUMNS: &[&str] = &[
    "scheme",
    "identifier",
    "documentPath",
    "startLine",
    "endLine",
    "startCharacter",
    "endCharacter",
];

fn insert_moniker_ranges(
    state: &CorrelationState,
    data: &BTreeMap<Id, ResultData>,
    monikers: &BTreeMap<&Id, IdSet>,
    inserter: &mut BatchInserter,
    cancel: &CancelFlag,
) -> Result<()> {
    for (result_id, document_ranges) in data {
        // Nothing to insert for results no moniker is attached to.
        let Some(moniker_ids) = monikers.get(result_id) else {
            continue;
        };

        for moniker_id in moniker_ids.iter() {
            cancel.check()?;

            let Some(moniker) = state.moniker_data.get(moniker_id) else {
                continue;
            };

            for (document_id, range_ids) in document_ranges {
                // Skip results pointing at documents not present in the
                // dump; emitting them would produce rows whose document
                // data can never be resolved.
                let Some(document) = state.document_data.get(document_id) else {
                    continue;
                };
                if document.uri.starts_with("..") {
                    continue;
                }

                for range_id in range_ids.iter() {
                    let Some(range) = state.range_data.get(range_id) else {
                        continue;
                    };

                    inserter.insert(vec![
                        Value::Text(moniker.scheme.clone()),
                        Value::Text(moniker.identifier.clone()),
                        Value::Text(document.uri.clone()),
                        Value::Integer(i64::from(range.start_line)),
                        Value::Integer(i64::from(range.end_line)),
                        Value::Integer(i64::from(range.start_character)),
                        Value::Integer(i64::from(range.end_character)),
                    ])?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn id(s: &str) -> Id {
        Id::from(s)
    }

    // Fixed vectors pinning the on-disk hash. These must never change.
    #[test]
    fn hash_key_matches_legacy_implementation() {
        let vectors: &[(&str, usize, usize)] = &[
            ("document-42", 100, 84),
            ("0", 1, 0),
            ("1", 16, 1),
            ("42", 100, 62),
            ("1234567890", 1000, 789),
            ("result-chunk-0", 512, 224),
            ("definitionResult:7", 1000, 661),
            ("a", 7, 6),
            ("abcdefghij", 1000, 659),
            ("zzzzzzzz", 999, 846),
            ("moniker:gomod:pkg/Foo", 250, 212),
            ("", 10, 0),
        ];

        for (input, max_index, expected) in vectors {
            assert_eq!(
                hash_key(&id(input), *max_index),
                *expected,
                "hash_key({:?}, {})",
                input,
                max_index
            );
        }
    }

    #[test]
    fn hash_key_wraps_like_signed_32_bit() {
        // Long inputs overflow 32 bits; the wraparound is part of the
        // on-disk contract.
        let long_id = id("this-identifier-is-long-enough-to-overflow-an-int32");
        assert_eq!(hash_key(&long_id, 1000), 527);
    }

    #[test]
    fn gzip_json_round_trips() {
        let blob = gzip_json(&serde_json::json!({"key": "value"})).unwrap();

        let mut decoder = GzDecoder::new(blob.as_slice());
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, r#"{"key":"value"}"#);
    }

    #[test]
    fn gzip_json_is_deterministic() {
        let value = serde_json::json!({"b": 1, "a": 2});
        assert_eq!(gzip_json(&value).unwrap(), gzip_json(&value).unwrap());
    }

    #[test]
    fn result_chunk_count_is_clamped() {
        let chunk_count = |num_results: usize| {
            (num_results / RESULTS_PER_RESULT_CHUNK).clamp(1, MAX_NUM_RESULT_CHUNKS)
        };

        assert_eq!(chunk_count(0), 1);
        assert_eq!(chunk_count(499), 1);
        assert_eq!(chunk_count(500), 1);
        assert_eq!(chunk_count(1000), 2);
        assert_eq!(chunk_count(750_000), 1000);
    }
}
