//! File boundary of the graph store
//!
//! The only place in the engine that touches the filesystem. Format is chosen
//! by extension: `.json` files hold the serde form, everything else the
//! binary codec.

use crate::codec;
use crate::error::StoreError;
use crate::graph::Graph;
use std::path::Path;

/// Persisted representation of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    /// Length-prefixed binary codec
    Binary,
    /// Pretty-printed JSON
    Json,
}

impl GraphFormat {
    /// Pick a format from a path's extension
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Binary,
        }
    }

    /// Decode bytes in this format
    ///
    /// # Errors
    /// [`StoreError`] when the bytes are not a well-formed graph
    pub fn decode(self, bytes: &[u8], origin: &Path) -> Result<Graph, StoreError> {
        match self {
            Self::Binary => codec::load(bytes).map_err(|source| StoreError::Parse {
                path: origin.to_path_buf(),
                source,
            }),
            Self::Json => from_json(bytes),
        }
    }

    /// Encode a graph in this format
    ///
    /// # Errors
    /// Only JSON encoding can fail
    pub fn encode(self, graph: &Graph) -> Result<Vec<u8>, StoreError> {
        match self {
            Self::Binary => Ok(codec::save(graph)),
            Self::Json => to_json(graph),
        }
    }
}

/// Serialize to pretty JSON
///
/// # Errors
/// Propagates serde failures
pub fn to_json(graph: &Graph) -> Result<Vec<u8>, StoreError> {
    let mut out = serde_json::to_vec_pretty(graph)?;
    out.push(b'\n');
    Ok(out)
}

/// Parse the JSON form, applying the same name checks as the binary loader
///
/// # Errors
/// [`StoreError::Json`] or [`StoreError::Malformed`]
pub fn from_json(bytes: &[u8]) -> Result<Graph, StoreError> {
    let graph: Graph = serde_json::from_slice(bytes)?;
    graph.check_names()?;
    Ok(graph)
}

/// Read a graph file
///
/// # Errors
/// I/O or decoding failure, carrying the path
pub fn read_graph(path: impl AsRef<Path>) -> Result<Graph, StoreError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| StoreError::io_error(path, e))?;
    GraphFormat::from_path(path).decode(&bytes, path)
}

/// Write a graph file, returning the bytes written
///
/// # Errors
/// I/O or encoding failure, carrying the path
pub fn write_graph(path: impl AsRef<Path>, graph: &Graph) -> Result<Vec<u8>, StoreError> {
    let path = path.as_ref();
    let bytes = GraphFormat::from_path(path).encode(graph)?;
    std::fs::write(path, &bytes).map_err(|e| StoreError::io_error(path, e))?;
    Ok(bytes)
}
