//! Error types for the namespace store

use thiserror::Error;

/// Classification shared by every edgefleet error type.
///
/// Orchestration decides whether a failure is fatal by looking at its kind,
/// never at the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced namespace, agent or controller does not exist
    NotFound,
    /// The resource already exists where creation was requested
    Conflict,
    /// Malformed or contradictory user input
    Input,
    /// The program violated one of its own invariants
    Internal,
    /// The target backend lacks a required capability
    NotSupported,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Input => "input",
            ErrorKind::Internal => "internal",
            ErrorKind::NotSupported => "not supported",
        };
        f.write_str(s)
    }
}

/// Namespace store error type
#[derive(Error, Debug)]
pub enum Error {
    /// Namespace not found
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Resource not found inside a namespace
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        /// Resource kind, e.g. "agent"
        kind: &'static str,
        /// Namespace searched
        namespace: String,
        /// Resource name
        name: String,
    },

    /// Resource already exists
    #[error("{kind} '{name}' already exists in namespace '{namespace}'")]
    AlreadyExists {
        /// Resource kind, e.g. "agent"
        kind: &'static str,
        /// Namespace of the resource
        namespace: String,
        /// Resource name
        name: String,
    },

    /// The requested change conflicts with the namespace contents
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid resource definition
    #[error("invalid {kind} '{name}': {reason}")]
    Invalid {
        /// Resource kind
        kind: &'static str,
        /// Resource name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),

    /// Sled database error
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NamespaceNotFound(_) | Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } | Error::Conflict(_) => ErrorKind::Conflict,
            Error::Invalid { .. } => ErrorKind::Input,
            Error::Internal(_) | Error::Database(_) | Error::Json(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
