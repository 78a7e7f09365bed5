//! Content fingerprints
//!
//! A [`Fingerprint`] is the Blake3 hash of a graph's binary form. Because the
//! codec has a single encoding per graph, equal graphs hash equally.

use crate::codec;
use crate::graph::Graph;
use std::fmt::{self, Display, Formatter};

/// 32-byte Blake3 hash of a graph's binary encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash raw bytes
    #[inline]
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a graph's binary form
    #[must_use]
    pub fn of_graph(graph: &Graph) -> Self {
        Self::of_bytes(&codec::save(graph))
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
