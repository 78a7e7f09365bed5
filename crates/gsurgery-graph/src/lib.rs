//! Graph Store
//!
//! In-memory model of a serialized dataflow graph and its persisted forms.
//!
//! # Core Concepts
//!
//! - [`Graph`]: ordered node sequence; order carries no meaning
//! - [`Node`]: named operation with positional [`InputRef`]s and typed attributes
//! - [`AttrValue`]: type tag, int, float, bool, bytes, shape, tensor or list
//! - [`load`] / [`save`]: binary codec with an exact round trip
//! - [`Fingerprint`]: Blake3 hash of the binary form
//!
//! # Example
//!
//! ```rust
//! use gsurgery_graph::{load, save, Graph, Node};
//!
//! let graph = Graph::from_nodes(vec![
//!     Node::new("images", "Placeholder"),
//!     Node::new("out", "Identity").input("images"),
//! ]);
//! let bytes = save(&graph);
//! assert_eq!(load(&bytes).unwrap(), graph);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod attr;
mod codec;
mod error;
mod fingerprint;
mod graph;
mod node;
mod store;

pub use attr::{AttrValue, DataType, TensorValue};
pub use codec::{load, save, FORMAT_MAJOR, FORMAT_MINOR, MAGIC, MAX_LIST_DEPTH};
pub use error::{GraphError, ParseError, StoreError};
pub use fingerprint::Fingerprint;
pub use graph::{Graph, NameIndex};
pub use node::{AttrMap, InputRef, Node};
pub use store::{from_json, read_graph, to_json, write_graph, GraphFormat};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
