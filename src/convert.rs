//! The conversion driver
//!
//! Runs the pipeline end to end: correlate the dump, canonicalize the
//! graph, prune paths missing from the repository, and write the bundle.
//! Returns the package and reference summaries the cross-bundle index
//! consumes. On error or cancellation the partial bundle file is removed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::canonicalize::canonicalize;
use crate::correlate::{correlate, CorrelationState};
use crate::error::{ConvertError, Result};
use crate::existence::RevisionControl;
use crate::prune::prune;
use crate::writer::write;

/// A cooperative cancellation handle. Cloned flags observe the same signal;
/// the conversion checks it at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(ConvertError::Canceled);
        }
        Ok(())
    }
}

/// A package some moniker in the dump provides to other indexes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Package {
    pub scheme: String,
    pub name: String,
    pub version: String,
}

/// A package the dump depends on, with the identifiers it references.
/// Downstream code turns the identifier list into a membership filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub scheme: String,
    pub name: String,
    pub version: String,
    pub identifiers: Vec<String>,
}

/// Convert the gzip-compressed dump at `input` into a bundle at `output`.
///
/// `dump_root` is the repository subdirectory the indexer ran from and
/// `commit` the revision the dump was indexed at; together with the
/// revision-control collaborator they drive path-existence pruning.
pub fn convert(
    input: &Path,
    output: &Path,
    dump_root: &str,
    commit: &str,
    revision_control: &dyn RevisionControl,
    cancel: &CancelFlag,
) -> Result<(Vec<Package>, Vec<Reference>)> {
    let result = convert_inner(input, output, dump_root, commit, revision_control, cancel);
    if result.is_err() {
        // Nothing downstream may observe a partial bundle.
        let _ = fs::remove_file(output);
    }
    result
}

fn convert_inner(
    input: &Path,
    output: &Path,
    dump_root: &str,
    commit: &str,
    revision_control: &dyn RevisionControl,
    cancel: &CancelFlag,
) -> Result<(Vec<Package>, Vec<Reference>)> {
    let mut state = correlate(input, dump_root, cancel)?;
    canonicalize(&mut state);
    prune(&mut state, commit, revision_control, cancel)?;
    write(&state, output, cancel)?;

    let packages = extract_packages(&state);
    let references = extract_references(&state);

    info!(
        input = %input.display(),
        output = %output.display(),
        packages = packages.len(),
        references = references.len(),
        "converted dump"
    );

    Ok((packages, references))
}

/// The deduplicated `(scheme, name, version)` triples this dump exports.
fn extract_packages(state: &CorrelationState) -> Vec<Package> {
    let mut packages = BTreeSet::new();
    for moniker_id in state.exported_monikers.iter() {
        let Some(moniker) = state.moniker_data.get(moniker_id) else {
            continue;
        };
        let Some(package_information) = moniker
            .package_information_id
            .as_ref()
            .and_then(|id| state.package_information_data.get(id))
        else {
            continue;
        };

        packages.insert(Package {
            scheme: moniker.scheme.clone(),
            name: package_information.name.clone(),
            version: package_information.version.clone(),
        });
    }

    packages.into_iter().collect()
}

/// The packages this dump imports, grouped with the distinct moniker
/// identifiers used from each.
fn extract_references(state: &CorrelationState) -> Vec<Reference> {
    let mut grouped: BTreeMap<(String, String, String), BTreeSet<String>> = BTreeMap::new();
    for moniker_id in state.imported_monikers.iter() {
        let Some(moniker) = state.moniker_data.get(moniker_id) else {
            continue;
        };
        let Some(package_information) = moniker
            .package_information_id
            .as_ref()
            .and_then(|id| state.package_information_data.get(id))
        else {
            continue;
        };

        grouped
            .entry((
                moniker.scheme.clone(),
                package_information.name.clone(),
                package_information.version.clone(),
            ))
            .or_default()
            .insert(moniker.identifier.clone());
    }

    grouped
        .into_iter()
        .map(|((scheme, name, version), identifiers)| Reference {
            scheme,
            name,
            version,
            identifiers: identifiers.into_iter().collect(),
        })
        .collect()
}
