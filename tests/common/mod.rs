//! Common test utilities for lsif-bundler integration tests
//!
//! Provides a `DumpBuilder` for assembling gzip-compressed LSIF dumps and a
//! `FakeRevisionControl` standing in for the directory-listing collaborator.

#![allow(dead_code)]

pub mod dump;
pub mod revision;

pub use dump::DumpBuilder;
pub use revision::FakeRevisionControl;

use std::io::Read;

use flate2::read::GzDecoder;
use rusqlite::Connection;

/// Open a produced bundle for assertions.
pub fn open_bundle(path: &std::path::Path) -> Connection {
    Connection::open(path).expect("bundle should open")
}

/// Decode a gzip-compressed JSON blob column into a value.
pub fn decode_blob(blob: &[u8]) -> serde_json::Value {
    let mut decoder = GzDecoder::new(blob);
    let mut json = String::new();
    decoder
        .read_to_string(&mut json)
        .expect("blob should decompress");
    serde_json::from_str(&json).expect("blob should be JSON")
}
