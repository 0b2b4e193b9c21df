//! lsif-bundler: LSIF dump to bundle conversion
//!
//! This library converts LSIF (Language Server Index Format) dumps produced
//! by language indexers into self-contained SQLite bundles queryable by
//! hover, definition, and references operations.
//!
//! The pipeline runs in four sequential stages over one dump:
//!
//! 1. **Correlate** - stream the gzip-compressed, line-delimited dump and
//!    reconstruct the implicit graph into in-memory state.
//! 2. **Canonicalize** - merge duplicate documents, collapse linked
//!    reference results, fold result set chains, aggregate monikers.
//! 3. **Prune** - drop documents (and data pointing into them) that do not
//!    exist in the repository at the indexed commit.
//! 4. **Write** - materialize the five-table bundle and derive the package
//!    and reference summaries for the cross-bundle index.
//!
//! # Example
//!
//! ```ignore
//! use lsif_bundler::convert::{convert, CancelFlag};
//! use lsif_bundler::gitserver::GitCli;
//!
//! let git = GitCli::new(std::path::Path::new("/repos/example"));
//! let (packages, references) = convert(
//!     std::path::Path::new("dump.lsif.gz"),
//!     std::path::Path::new("out.bundle.db"),
//!     "",
//!     "HEAD",
//!     &git,
//!     &CancelFlag::new(),
//! )?;
//! ```

pub mod canonicalize;
pub mod cli;
pub mod convert;
pub mod correlate;
pub mod element;
pub mod error;
pub mod existence;
pub mod gitserver;
pub mod hover;
pub mod id;
pub mod inserter;
pub mod prune;
pub mod sets;
pub mod writer;

// Re-export commonly used types
pub use convert::{convert, CancelFlag, Package, Reference};
pub use correlate::{correlate, CorrelationState};
pub use error::{ConvertError, Result};
pub use existence::{ExistenceChecker, RevisionControl};
pub use id::Id;
pub use sets::{DisjointIdSet, IdSet};
pub use writer::{hash_key, INTERNAL_VERSION, MAX_NUM_RESULT_CHUNKS, RESULTS_PER_RESULT_CHUNK};
