//! Error types for the graph store
//!
//! - [`ParseError`]: bytes could not be decoded into a well-formed graph
//! - [`GraphError`]: structural problems in an in-memory graph
//! - [`StoreError`]: file-level failures (I/O, JSON, parse)

use std::path::PathBuf;

/// Failure decoding the persisted form
///
/// Offsets are byte positions in the input so a corrupt file can be located
/// without re-scanning it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Magic header mismatch
    #[error("not a graph file: bad magic")]
    BadMagic,

    /// Major format version not understood by this decoder
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// Input ended in the middle of a value
    #[error("truncated input at byte {offset}")]
    UnexpectedEof { offset: usize },

    /// Varint overflowed or did not terminate
    #[error("invalid varint at byte {offset}")]
    InvalidVarint { offset: usize },

    /// A length or count does not fit the target type
    #[error("length out of bounds at byte {offset}")]
    OutOfBounds { offset: usize },

    /// A string field is not UTF-8
    #[error("invalid utf-8 at byte {offset}")]
    InvalidUtf8 { offset: usize },

    /// Unknown attribute value tag
    #[error("unknown attribute tag {tag} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },

    /// A flag byte was neither 0 nor 1
    #[error("invalid flag byte {value} at byte {offset}")]
    InvalidFlag { value: u8, offset: usize },

    /// Lists nested deeper than the decoder accepts
    #[error("lists nested too deep at byte {offset}")]
    TooDeep { offset: usize },

    /// Bytes left over after the last node
    #[error("{remaining} trailing bytes after graph at byte {offset}")]
    TrailingBytes { offset: usize, remaining: usize },

    /// Decoded node sequence is not well-formed
    #[error("malformed graph: {0}")]
    Malformed(#[from] GraphError),
}

/// Structural problem in a graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two nodes share a name
    #[error("duplicate node name: '{0}'")]
    DuplicateNode(String),

    /// Node at the given position has an empty name
    #[error("node #{index} has an empty name")]
    EmptyName { index: usize },

    /// An input references a producer that does not exist
    #[error("node '{consumer}' references missing producer '{producer}'")]
    UnresolvedInput { consumer: String, producer: String },

    /// Input references form a cycle through this node
    #[error("cycle detected through node '{0}'")]
    Cycle(String),

    /// Textual input reference could not be parsed
    #[error("invalid input reference: '{0}'")]
    InvalidInputRef(String),

    /// Unrecognised data type name
    #[error("unknown data type: '{0}'")]
    UnknownDataType(String),
}

/// File-level graph store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error during read or write
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Binary form could not be decoded
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// JSON form could not be decoded or encoded
    #[error("invalid graph json: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON form decoded but is not well-formed
    #[error("malformed graph: {0}")]
    Malformed(#[from] GraphError),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure came from decoding rather than the filesystem
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Json(_) | Self::Malformed(_))
    }
}
