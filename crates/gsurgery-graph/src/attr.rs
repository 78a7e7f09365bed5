//! Typed attribute values
//!
//! Passes treat almost every value opaquely. Only type tags and shapes are
//! ever inspected, and only by key.

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Scalar element type tag
///
/// Numeric codes follow the common dataflow-graph numbering so that graphs
/// converted from foreign formats keep their codes. Codes the engine does not
/// name survive round trips as [`DataType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Float32,
    Float64,
    Int32,
    UInt8,
    Int16,
    Int8,
    String,
    Complex64,
    Int64,
    Bool,
    BFloat16,
    UInt16,
    Float16,
    Resource,
    Variant,
    UInt32,
    UInt64,
    /// Unnamed code, preserved verbatim
    Other(u32),
}

/// (variant, code, canonical name, foreign alias)
const TYPE_TABLE: &[(DataType, u32, &str, &str)] = &[
    (DataType::Float32, 1, "float32", "DT_FLOAT"),
    (DataType::Float64, 2, "float64", "DT_DOUBLE"),
    (DataType::Int32, 3, "int32", "DT_INT32"),
    (DataType::UInt8, 4, "uint8", "DT_UINT8"),
    (DataType::Int16, 5, "int16", "DT_INT16"),
    (DataType::Int8, 6, "int8", "DT_INT8"),
    (DataType::String, 7, "string", "DT_STRING"),
    (DataType::Complex64, 8, "complex64", "DT_COMPLEX64"),
    (DataType::Int64, 9, "int64", "DT_INT64"),
    (DataType::Bool, 10, "bool", "DT_BOOL"),
    (DataType::BFloat16, 14, "bfloat16", "DT_BFLOAT16"),
    (DataType::UInt16, 17, "uint16", "DT_UINT16"),
    (DataType::Float16, 19, "float16", "DT_HALF"),
    (DataType::Resource, 20, "resource", "DT_RESOURCE"),
    (DataType::Variant, 21, "variant", "DT_VARIANT"),
    (DataType::UInt32, 22, "uint32", "DT_UINT32"),
    (DataType::UInt64, 23, "uint64", "DT_UINT64"),
];

impl DataType {
    /// Numeric code used by the binary format
    #[must_use]
    pub fn code(self) -> u32 {
        if let Self::Other(code) = self {
            return code;
        }
        TYPE_TABLE
            .iter()
            .find(|(dt, ..)| *dt == self)
            .map_or(0, |(_, code, ..)| *code)
    }

    /// Inverse of [`DataType::code`]; never fails
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        TYPE_TABLE
            .iter()
            .find(|(_, c, ..)| *c == code)
            .map_or(Self::Other(code), |(dt, ..)| *dt)
    }

    /// Size of one element in bytes, when fixed
    #[must_use]
    pub const fn element_size(self) -> Option<usize> {
        match self {
            Self::Float32 | Self::Int32 | Self::UInt32 => Some(4),
            Self::Float64 | Self::Int64 | Self::UInt64 | Self::Complex64 => Some(8),
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => Some(2),
            Self::Int8 | Self::UInt8 | Self::Bool => Some(1),
            Self::String | Self::Resource | Self::Variant | Self::Other(_) => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "type{code}"),
            dt => {
                let name = TYPE_TABLE
                    .iter()
                    .find(|(t, ..)| t == dt)
                    .map_or("unknown", |(_, _, name, _)| *name);
                f.write_str(name)
            }
        }
    }
}

impl FromStr for DataType {
    type Err = GraphError;

    /// Accepts canonical names (`float32`), foreign aliases (`DT_FLOAT`) and
    /// `type<N>` for unnamed codes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((dt, ..)) = TYPE_TABLE
            .iter()
            .find(|(_, _, name, alias)| *name == s || alias.eq_ignore_ascii_case(s))
        {
            return Ok(*dt);
        }
        s.strip_prefix("type")
            .and_then(|code| code.parse::<u32>().ok())
            .map(Self::from_code)
            .ok_or_else(|| GraphError::UnknownDataType(s.to_string()))
    }
}

impl Serialize for DataType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Embedded constant tensor
///
/// `content` is the flat little-endian value buffer; the engine never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorValue {
    /// Element type
    pub dtype: DataType,
    /// Concrete dimensions
    pub dims: Vec<u64>,
    /// Raw value buffer
    #[serde(with = "bytes_repr")]
    pub content: Vec<u8>,
}

impl TensorValue {
    /// Number of elements implied by `dims` (1 for scalars)
    #[must_use]
    pub fn element_count(&self) -> u64 {
        self.dims.iter().product()
    }
}

/// A typed attribute value
///
/// Floats compare by bit pattern, so every value equals itself (NaN
/// included) and `-0.0` differs from `0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    /// Scalar type tag
    Type(DataType),
    /// Signed integer
    Int(i64),
    /// Single precision float
    #[serde(with = "float_repr")]
    Float(f32),
    /// Boolean
    Bool(bool),
    /// Byte string (padding modes, data formats, ...)
    #[serde(with = "bytes_repr")]
    Bytes(Vec<u8>),
    /// Shape; `None` marks an unknown dimension
    Shape(Vec<Option<i64>>),
    /// Embedded constant
    Tensor(TensorValue),
    /// Homogeneous or mixed list (strides, dilations, paddings)
    List(Vec<AttrValue>),
}

impl AttrValue {
    /// Byte string from UTF-8 text
    #[inline]
    #[must_use]
    pub fn text(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }

    /// List of integers
    #[must_use]
    pub fn ints(values: &[i64]) -> Self {
        Self::List(values.iter().copied().map(Self::Int).collect())
    }

    /// Type tag, if this is one
    #[inline]
    #[must_use]
    pub const fn as_type(&self) -> Option<DataType> {
        match self {
            Self::Type(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Integer, if this is one
    #[inline]
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Shape dimensions, if this is a shape
    #[inline]
    #[must_use]
    pub fn as_shape(&self) -> Option<&[Option<i64>]> {
        match self {
            Self::Shape(dims) => Some(dims),
            _ => None,
        }
    }

    /// Short kind name for diagnostics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Type(_) => "type",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Shape(_) => "shape",
            Self::Tensor(_) => "tensor",
            Self::List(_) => "list",
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Shape(a), Self::Shape(b)) => a == b,
            (Self::Tensor(a), Self::Tensor(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttrValue {}

/// Finite floats are JSON numbers; NaN and the infinities are their bit
/// pattern as a hex string such as `"0x7fc00000"`
///
/// `"nan"`, `"inf"` and `"-inf"` are also accepted on input.
mod float_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f32),
        Text(String),
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(super) fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f32(*value)
        } else {
            serializer.serialize_str(&format!("{:#010x}", value.to_bits()))
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        let text = match Repr::deserialize(deserializer)? {
            Repr::Number(value) => return Ok(value),
            Repr::Text(text) => text,
        };
        match text.as_str() {
            "nan" => Ok(f32::NAN),
            "inf" => Ok(f32::INFINITY),
            "-inf" => Ok(f32::NEG_INFINITY),
            _ => text
                .strip_prefix("0x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .map(f32::from_bits)
                .ok_or_else(|| D::Error::custom(format!("invalid float: '{text}'"))),
        }
    }
}

/// Byte strings read as text in JSON when they are valid UTF-8
mod bytes_repr {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Raw(Vec<u8>),
    }

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.serialize(serializer),
            Err(_) => bytes.serialize(serializer),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.into_bytes(),
            Repr::Raw(raw) => raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_codes_are_stable() {
        assert_eq!(DataType::Float32.code(), 1);
        assert_eq!(DataType::Float16.code(), 19);
        assert_eq!(DataType::from_code(9), DataType::Int64);
        assert_eq!(DataType::from_code(99), DataType::Other(99));
        assert_eq!(DataType::Other(99).code(), 99);
    }

    #[test]
    fn data_type_names_and_aliases() {
        assert_eq!("float32".parse::<DataType>().unwrap(), DataType::Float32);
        assert_eq!("DT_FLOAT".parse::<DataType>().unwrap(), DataType::Float32);
        assert_eq!("dt_half".parse::<DataType>().unwrap(), DataType::Float16);
        assert_eq!("type42".parse::<DataType>().unwrap(), DataType::Other(42));
        assert_eq!(DataType::Other(42).to_string(), "type42");
        assert!("quaternion".parse::<DataType>().is_err());
    }

    #[test]
    fn json_bytes_prefer_text() {
        let value = AttrValue::text("SAME");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"bytes":"SAME"}"#);

        let raw = AttrValue::Bytes(vec![0xff, 0x00]);
        let json = serde_json::to_string(&raw).unwrap();
        let back: AttrValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn floats_compare_by_bits() {
        let nan = AttrValue::Float(f32::NAN);
        assert_eq!(nan, nan.clone());
        assert_ne!(AttrValue::Float(0.0), AttrValue::Float(-0.0));
        assert_ne!(AttrValue::Float(1.0), AttrValue::Int(1));
    }

    #[test]
    fn json_non_finite_floats() {
        let nan = AttrValue::Float(f32::from_bits(0x7fc0_0001));
        let json = serde_json::to_string(&nan).unwrap();
        assert_eq!(json, r#"{"float":"0x7fc00001"}"#);
        assert_eq!(serde_json::from_str::<AttrValue>(&json).unwrap(), nan);

        let inf: AttrValue = serde_json::from_str(r#"{"float":"-inf"}"#).unwrap();
        assert_eq!(inf, AttrValue::Float(f32::NEG_INFINITY));
        let finite: AttrValue = serde_json::from_str(r#"{"float":0.5}"#).unwrap();
        assert_eq!(finite, AttrValue::Float(0.5));
        assert!(serde_json::from_str::<AttrValue>(r#"{"float":"half"}"#).is_err());
    }

    #[test]
    fn tensor_element_count() {
        let t = TensorValue {
            dtype: DataType::Int32,
            dims: vec![4],
            content: vec![0; 16],
        };
        assert_eq!(t.element_count(), 4);
        let scalar = TensorValue {
            dtype: DataType::Int32,
            dims: vec![],
            content: vec![0; 4],
        };
        assert_eq!(scalar.element_count(), 1);
    }
}
