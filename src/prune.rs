//! Pruning of data that points outside the repository tree
//!
//! Documents that do not exist at the indexed commit (generated files,
//! uncommitted dependencies) are removed, along with definition and
//! reference entries keyed by them. Keeping these would let queries
//! resolve to paths that do not exist in the repository.

use tracing::debug;

use crate::convert::CancelFlag;
use crate::correlate::CorrelationState;
use crate::error::Result;
use crate::existence::{ExistenceChecker, RevisionControl};

/// Remove unreachable documents and the definition/reference entries that
/// point into them.
pub fn prune(
    state: &mut CorrelationState,
    commit: &str,
    revision_control: &dyn RevisionControl,
    cancel: &CancelFlag,
) -> Result<()> {
    let paths: Vec<String> = state
        .document_data
        .values()
        .map(|document| document.uri.clone())
        .collect();

    let checker = ExistenceChecker::new(
        &state.dump_root,
        &paths,
        commit,
        revision_control,
        cancel,
    )?;

    let before = state.document_data.len();
    state
        .document_data
        .retain(|_, document| checker.should_include(&document.uri));

    // Dropping documents leaves dangling entries in the result maps; remove
    // them too so no output row can point at a pruned path. Ranges belonging
    // to pruned documents stay behind, which is harmless: the writer only
    // emits data reachable from a surviving document.
    let documents = &state.document_data;
    for document_map in state.definition_data.values_mut() {
        document_map.retain(|document_id, _| {
            documents
                .get(document_id)
                .is_some_and(|document| checker.should_include(&document.uri))
        });
    }
    for document_map in state.reference_data.values_mut() {
        document_map.retain(|document_id, _| {
            documents
                .get(document_id)
                .is_some_and(|document| checker.should_include(&document.uri))
        });
    }

    debug!(
        removed = before - state.document_data.len(),
        remaining = state.document_data.len(),
        "pruned documents"
    );

    Ok(())
}
