//! Error types for buildgate
//!
//! All modules use `ControlResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for control operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Boxed error from a collaborator (engine, cache manager, exporter)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// All errors that can occur in the control layer
#[derive(Error, Debug)]
pub enum ControlError {
    // Translation errors
    #[error("{kind} {name:?} could not be found")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid reference format {input:?}: {reason}")]
    Parse { input: String, reason: String },

    // Collaborator errors, message preserved as-is
    #[error(transparent)]
    Upstream(BoxError),

    // Stream errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ControlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Parse,
    Upstream,
    Transport,
    Cancelled,
    Internal,
}

impl ControlError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap a collaborator error without changing its message
    pub fn upstream(err: impl Into<BoxError>) -> Self {
        Self::Upstream(err.into())
    }

    /// Create a parse error for a reference string
    pub fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Transport(_) | Self::Io { .. } => ErrorKind::Transport,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::TaskPanicked(_)
            | Self::ConfigInvalid { .. }
            | Self::ConfigDirCreate { .. }
            | Self::TomlSerialize(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound {
                kind: "frontend", ..
            } => Some("Check the frontend name against the registered frontends"),
            Self::NotFound {
                kind: "exporter", ..
            } => Some("Check the exporter name against the registered exporters"),
            Self::Parse { .. } => {
                Some("References look like [domain/]path[:tag][@algo:hex], path in lowercase")
            }
            Self::ConfigInvalid { .. } => Some("Run: buildgate config init --force"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_missing_entry() {
        let err = ControlError::NotFound {
            kind: "exporter",
            name: "tarball".to_string(),
        };
        assert!(err.to_string().contains("tarball"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn upstream_keeps_original_message() {
        let err = ControlError::upstream("snapshotter unavailable");
        assert_eq!(err.to_string(), "snapshotter unavailable");
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn error_hint() {
        let err = ControlError::NotFound {
            kind: "frontend",
            name: "dockerfile.v9".to_string(),
        };
        assert!(err.hint().unwrap().contains("frontend"));
        assert_eq!(ControlError::Cancelled.hint(), None);
    }
}
