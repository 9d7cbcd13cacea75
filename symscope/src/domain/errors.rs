//! Structured error types for symscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Pid;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to construct a resolver for one symbol source
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied reading {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("{} is malformed: {reason}", path.display())]
    MalformedContainer { path: PathBuf, reason: String },

    #[error("Process {0} not found or its memory maps are unreadable")]
    ProcessNotFound(Pid),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LoadError {
    /// Classify an I/O error raised while reading `path`
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound { path },
            io::ErrorKind::PermissionDenied => LoadError::PermissionDenied { path },
            _ => LoadError::Io { path, source: err },
        }
    }

    pub(crate) fn malformed(path: &Path, reason: impl ToString) -> Self {
        LoadError::MalformedContainer { path: path.to_path_buf(), reason: reason.to_string() }
    }

    /// Returns true if retrying with elevated privilege may succeed
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, LoadError::PermissionDenied { .. })
    }
}

#[derive(Error, Debug)]
pub enum SymbolizeError {
    #[error("Failed to load symbol source #{index}: {source}")]
    Source {
        index: usize,
        #[source]
        source: LoadError,
    },
}

impl SymbolizeError {
    /// The load failure behind this error
    #[must_use]
    pub fn load_error(&self) -> &LoadError {
        match self {
            SymbolizeError::Source { source, .. } => source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}
