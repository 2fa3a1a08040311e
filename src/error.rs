//! Error types for assetsync
//!
//! This module defines every error that can occur while draining filesystem
//! events, mirroring the source/media tree or propagating renames.
//!
//! Very few of these ever reach the host. A drain cycle or a propagation step
//! never fails as a whole: individual failures are logged, recorded as warnings
//! in the returned report and the engine moves on to the next item. The error
//! type exists so that the building blocks (mirroring helpers, collaborators,
//! configuration loading) can propagate failures with `?` up to the point where
//! that decision is made.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the assetsync library
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for all assetsync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Error reported by the OS notification backend
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Content requested from a collaborator does not exist
    #[error("Content not found: {0:?}")]
    NotFound(PathBuf),

    /// Content exists but could not be parsed
    #[error("Failed to parse {path:?}: {message}")]
    Parse {
        /// Path of the offending file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The resource type of a file could not be derived from its name
    #[error("Cannot determine resource type of {0:?} from its file name")]
    TypeResolution(PathBuf),

    /// A move of a source/media item failed and could not be recovered
    #[error("Failed to move {from:?} to {to:?}: {source}")]
    MoveFailed {
        /// Original location
        from: PathBuf,
        /// Requested destination
        to: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A global rename propagation is already running
    #[error("A global rename propagation is already in progress")]
    PropagationInProgress,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid hidden-path pattern: {0}")]
    InvalidPattern(String),

    /// The engine builder was not given a required collaborator
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<globset::Error> for SyncError {
    fn from(err: globset::Error) -> Self {
        SyncError::InvalidPattern(err.to_string())
    }
}

impl SyncError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// Create a parse error for the given file
    pub fn parse(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        SyncError::Parse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Check if this error is a transient I/O condition
    ///
    /// Transient errors (locked files, cross-device moves, permission races with
    /// an external writer) are recovered locally, typically by falling back from
    /// a move to a copy.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Io(err) | SyncError::MoveFailed { source: err, .. } => matches!(
                err.kind(),
                std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::CrossesDevices
                    | std::io::ErrorKind::ResourceBusy
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::Other
            ),
            _ => false,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SyncError::TypeResolution(path) => {
                format!(
                    "Could not determine the resource type of {:?} from its name. \
                     References inside it were not updated; rename it to a recognized extension.",
                    path
                )
            }
            SyncError::PropagationInProgress => {
                "A rename is still being applied to the project. The new batch will run afterwards.".to_string()
            }
            SyncError::MissingCollaborator(name) => {
                format!("The engine was built without a {} implementation.", name)
            }
            _ => self.to_string(),
        }
    }
}
