//! Error types for the surgery passes
//!
//! - [`ExtractError`]: output names or references that do not resolve
//! - [`RewriteError`]: a disallowed node cannot be converted
//! - [`ConfigError`]: rule and taxonomy files
//! - [`SurgeryError`]: everything a pipeline run can fail with

use gsurgery_graph::{GraphError, StoreError};
use std::path::PathBuf;

/// Errors during backward-reachability extraction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// Requested output is not in the graph
    #[error("output node not found: '{0}'")]
    MissingNode(String),

    /// Traversal met a reference to a producer that does not exist
    #[error("node '{consumer}' references missing producer '{producer}'")]
    UnresolvedInput { consumer: String, producer: String },
}

/// Errors during operator rewriting
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    /// Node has fewer data inputs than its selection rule requires
    #[error("node '{node}' ({op}) needs {required} data inputs, has {actual}")]
    InsufficientInputs {
        node: String,
        op: String,
        required: usize,
        actual: usize,
    },

    /// The pass-through operator is itself disallowed
    #[error("pass-through operator '{0}' is in the disallowed set")]
    PassthroughDisallowed(String),

    /// Rewritten graph contains a cycle through this node
    #[error("rewritten graph has a cycle through '{0}'")]
    CycleIntroduced(String),

    /// A dropped input was the only path keeping its producer reachable
    #[error("rewriting '{node}' severs required producer '{producer}'")]
    SeveredDependency { node: String, producer: String },
}

/// Errors loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Extension maps to no known format
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    /// IO error during file read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File did not deserialize
    #[error("syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    /// One operator listed under both taxonomy categories
    #[error("operator '{0}' is both disallowed and suspicious")]
    CategoryConflict(String),

    /// Extract stage requested without output names
    #[error("extract stage requires at least one output name")]
    MissingOutputs,
}

impl ConfigError {
    /// Create syntax error for path
    pub fn syntax_error(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Syntax {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Combined error for a surgery run
#[derive(Debug, thiserror::Error)]
pub enum SurgeryError {
    /// Graph file could not be read or written
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Structural validation failed
    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    /// Extraction failed
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),

    /// Rewriting failed
    #[error("rewrite failed: {0}")]
    Rewrite(#[from] RewriteError),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl SurgeryError {
    /// Process exit status for this failure
    ///
    /// 1 I/O, 2 parse, 3 missing or unresolved node, 4 rewrite, 5 config,
    /// 6 validation.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Store(StoreError::Io { .. }) => 1,
            Self::Store(_) => 2,
            Self::Extract(_) => 3,
            Self::Rewrite(_) => 4,
            Self::Config(_) => 5,
            Self::Graph(_) => 6,
        }
    }
}

/// Result alias for pipeline operations
pub type SurgeryResult<T> = Result<T, SurgeryError>;
