//! Error types and exit codes for lsif-bundler

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for conversion operations
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("invalid input at line {line}: {message}")]
    Input { line: usize, message: String },

    #[error("no metadata defined")]
    MissingMetaData,

    #[error("malformed dump: element {id} references missing {} {references}", .kinds.join("/"))]
    MalformedDump {
        id: String,
        references: String,
        kinds: Vec<&'static str>,
    },

    #[error("document URI {uri} is not relative to project root {project_root}")]
    PathEscape { uri: String, project_root: String },

    #[error("git error: {message}")]
    Git { message: String },

    #[error("conversion canceled")]
    Canceled,

    #[error("bundle store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Convert error to an exit code:
    /// - 0: Success
    /// - 1: IO error
    /// - 2: Invalid or malformed dump
    /// - 3: Git error
    /// - 4: Bundle store error
    /// - 5: Canceled
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::Input { .. } => ExitCode::from(2),
            Self::MissingMetaData => ExitCode::from(2),
            Self::MalformedDump { .. } => ExitCode::from(2),
            Self::PathEscape { .. } => ExitCode::from(2),
            Self::Git { .. } => ExitCode::from(3),
            Self::Sqlite(_) => ExitCode::from(4),
            Self::Canceled => ExitCode::from(5),
        }
    }
}

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

pub(crate) fn malformed_dump(
    id: impl Into<String>,
    references: impl Into<String>,
    kinds: &[&'static str],
) -> ConvertError {
    ConvertError::MalformedDump {
        id: id.into(),
        references: references.into(),
        kinds: kinds.to_vec(),
    }
}
