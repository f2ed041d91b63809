//! Error types for sprat-engine

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Fatal build failure. No artifact is produced once one of these occurs.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Module source could not be read
    #[error("Failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Module source is malformed
    #[error("Failed to parse '{}': {message} at {line}:{column}", .path.display())]
    Parse {
        path: PathBuf,
        message: String,
        line: usize,
        column: usize,
    },

    /// Module parsed but could not be lowered
    #[error("Failed to lower '{}': {message}", .path.display())]
    Lower { path: PathBuf, message: String },

    /// Import specifier did not resolve to a file
    #[error("Cannot resolve '{specifier}' from '{}': {reason}", .importer.display())]
    Resolution {
        importer: PathBuf,
        specifier: String,
        reason: String,
    },

    /// Circular import rejected by the cycle policy
    #[error("Circular dependency detected: {}", format_cycle(.cycle))]
    Cycle { cycle: Vec<PathBuf> },
}

impl BuildError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn lower(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Lower {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Canonical path of the module the error is about.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } | Self::Lower { path, .. } => {
                Some(path)
            }
            Self::Resolution { importer, .. } => Some(importer),
            Self::Cycle { cycle } => cycle.first().map(PathBuf::as_path),
        }
    }
}

/// Why a resolver could not resolve a specifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ResolveError {
    pub reason: String,
}

impl ResolveError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

fn format_cycle(cycle: &[PathBuf]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(|p| p.display().to_string()).collect();
    if let Some(first) = parts.first().cloned() {
        parts.push(first);
    }
    parts.join(" -> ")
}

/// Result type using BuildError
pub type BuildResult<T> = Result<T, BuildError>;
