//! # Fleet Manifest
//!
//! Decoding of edgefleet deployment manifests.
//!
//! A manifest is a stream of YAML documents, each shaped like
//!
//! ```yaml
//! apiVersion: edgefleet.io/v3
//! kind: RemoteAgent
//! metadata:
//!   name: r1
//!   namespace: edge      # optional
//!   tags: [east]         # optional
//! spec: {}               # kind-specific
//! ```
//!
//! This crate turns the stream into [`Header`] envelopes. The `spec` of each
//! document stays an untyped YAML value until the kind-specific constructor
//! decodes it.

#![warn(missing_docs)]

use fleet_store::ErrorKind;
use thiserror::Error;

pub mod header;
pub mod parser;
pub mod resources;

pub use header::{Header, Kind, Metadata, SUPPORTED_API_VERSIONS};
pub use parser::{parse_file, parse_str, parse_str_with, substitute_env_vars};
pub use resources::{ControllerResource, decode_spec};

/// Manifest error types
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read the manifest file
    #[error("failed to read manifest: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Unknown apiVersion
    #[error("document {document} ('{name}'): unsupported apiVersion '{api_version}', expected one of {expected}")]
    UnsupportedApiVersion {
        /// Zero-based document index in the stream
        document: usize,
        /// Resource name
        name: String,
        /// Declared apiVersion
        api_version: String,
        /// Supported versions, comma separated
        expected: String,
    },

    /// Invalid manifest content
    #[error("invalid manifest: {0}")]
    Validation(String),

    /// Environment variable not set and no default given
    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// A document targets another namespace than the invocation
    #[error(
        "{kind} '{name}' declares namespace '{declared}' but the deployment targets namespace '{target}'"
    )]
    NamespaceMismatch {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Namespace in the document
        declared: String,
        /// Namespace of the invocation
        target: String,
    },
}

impl ManifestError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManifestError::Read(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            _ => ErrorKind::Input,
        }
    }
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;
