//! Nodes and input references
//!
//! A [`Node`] is a named operation. Its inputs are [`InputRef`]s that address
//! producers by name, never by position, which is what lets passes rewrite a
//! node in place without relinking any consumer.

use crate::attr::AttrValue;
use crate::error::GraphError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Reference from a consumer to one output of a producer
///
/// # Textual form
/// - `"conv1"` → slot 0 of `conv1`
/// - `"split:1"` → slot 1 of `split`
/// - `"^init"` → control dependency on `init` (no data flows)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputRef {
    producer: String,
    slot: u32,
    control: bool,
}

impl InputRef {
    /// Data reference to slot 0 of `producer`
    #[inline]
    #[must_use]
    pub fn new(producer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            slot: 0,
            control: false,
        }
    }

    /// Data reference to a specific output slot
    #[inline]
    #[must_use]
    pub fn with_slot(producer: impl Into<String>, slot: u32) -> Self {
        Self {
            producer: producer.into(),
            slot,
            control: false,
        }
    }

    /// Control-only reference (`^producer`)
    #[inline]
    #[must_use]
    pub fn control(producer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            slot: 0,
            control: true,
        }
    }

    /// Name of the producing node
    #[inline]
    #[must_use]
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Output slot on the producer
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Whether this is a control dependency
    #[inline]
    #[must_use]
    pub const fn is_control(&self) -> bool {
        self.control
    }

    /// Whether this reference carries data
    #[inline]
    #[must_use]
    pub const fn is_data(&self) -> bool {
        !self.control
    }

    /// Whether the textual form parses back to this reference
    ///
    /// False for an empty producer, or for one whose name would read back as
    /// a control marker or a slot suffix.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.to_string()
            .parse::<Self>()
            .is_ok_and(|parsed| parsed == *self)
    }
}

impl Display for InputRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.control {
            write!(f, "^{}", self.producer)
        } else if self.slot == 0 {
            f.write_str(&self.producer)
        } else {
            write!(f, "{}:{}", self.producer, self.slot)
        }
    }
}

impl FromStr for InputRef {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix('^') {
            if name.is_empty() {
                return Err(GraphError::InvalidInputRef(s.to_string()));
            }
            return Ok(Self::control(name));
        }

        // A suffix only counts as a slot when it is all digits; names may
        // legitimately contain ':' in foreign graphs.
        let (name, slot) = match s.rsplit_once(':') {
            Some((name, digits))
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) =>
            {
                let slot = digits
                    .parse::<u32>()
                    .map_err(|_| GraphError::InvalidInputRef(s.to_string()))?;
                (name, slot)
            }
            _ => (s, 0),
        };

        if name.is_empty() {
            return Err(GraphError::InvalidInputRef(s.to_string()));
        }
        Ok(Self::with_slot(name, slot))
    }
}

impl From<&str> for InputRef {
    /// Parses the textual form
    ///
    /// Text that does not parse (`""`, `"^"`) is kept verbatim as a slot-0
    /// producer name. Such a reference is not [well formed](Self::is_well_formed);
    /// [`Graph::check_names`](crate::Graph::check_names) rejects it, and so do
    /// `validate`, `load` and `from_json`.
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| Self::new(s))
    }
}

impl Serialize for InputRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InputRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered attribute map (insertion order is part of the persisted form)
pub type AttrMap = IndexMap<String, AttrValue>;

/// A named operation in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique, non-empty name
    pub name: String,
    /// Operator tag, e.g. `Conv2D` or `Reshape`
    pub op: String,
    /// Positional input references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputRef>,
    /// Typed attributes
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: AttrMap,
}

impl Node {
    /// Create a node with no inputs and no attributes
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            inputs: Vec::new(),
            attrs: AttrMap::new(),
        }
    }

    /// Append an input, builder style
    #[inline]
    #[must_use]
    pub fn input(mut self, input: impl Into<InputRef>) -> Self {
        self.inputs.push(input.into());
        self
    }

    /// Append several inputs, builder style
    #[must_use]
    pub fn inputs<I, R>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<InputRef>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Set an attribute, builder style
    #[inline]
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Data inputs only, in positional order
    pub fn data_inputs(&self) -> impl Iterator<Item = &InputRef> + '_ {
        self.inputs.iter().filter(|i| i.is_data())
    }

    /// Number of data inputs
    #[must_use]
    pub fn data_input_count(&self) -> usize {
        self.data_inputs().count()
    }

    /// Look up an attribute
    #[inline]
    #[must_use]
    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Whether any input references `producer`
    #[must_use]
    pub fn consumes(&self, producer: &str) -> bool {
        self.inputs.iter().any(|i| i.producer() == producer)
    }
}
