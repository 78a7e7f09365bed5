//! Binary graph codec
//!
//! Length-prefixed, little-endian layout with LEB128 varints:
//!
//! ```text
//! "GSRG" | u16 major | u16 minor | uleb node_count | node*
//! node   := str name | str op | uleb n (str producer | uleb slot | u8 control)*
//!           | uleb n (str key | value)*
//! value  := u8 tag | payload
//! ```
//!
//! Every field has exactly one encoding, so `save(load(save(g))) == save(g)`
//! holds byte-for-byte.

use crate::attr::{AttrValue, DataType, TensorValue};
use crate::error::ParseError;
use crate::graph::Graph;
use crate::node::{AttrMap, InputRef, Node};

/// File magic
pub const MAGIC: [u8; 4] = *b"GSRG";
/// Major version written and accepted
pub const FORMAT_MAJOR: u16 = 1;
/// Minor version written; any minor is accepted
pub const FORMAT_MINOR: u16 = 0;

const TAG_TYPE: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_BYTES: u8 = 4;
const TAG_SHAPE: u8 = 5;
const TAG_TENSOR: u8 = 6;
const TAG_LIST: u8 = 7;

/// Deepest list nesting `load` accepts; `save` does not check it
pub const MAX_LIST_DEPTH: usize = 64;

/// Decode a graph from its binary form
///
/// # Errors
/// [`ParseError`] on malformed framing, truncation, trailing bytes, lists
/// nested deeper than [`MAX_LIST_DEPTH`], or a node sequence with empty or
/// duplicate names or malformed input references
pub fn load(bytes: &[u8]) -> Result<Graph, ParseError> {
    let mut r = Reader::new(bytes);

    if r.read_bytes(MAGIC.len())? != MAGIC {
        return Err(ParseError::BadMagic);
    }
    let major = r.read_u16_le()?;
    let minor = r.read_u16_le()?;
    if major != FORMAT_MAJOR {
        return Err(ParseError::UnsupportedVersion { major, minor });
    }

    let count = r.read_len()?;
    // Cap the pre-allocation by what the input could possibly hold.
    let mut nodes = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        nodes.push(read_node(&mut r)?);
    }

    if r.remaining() != 0 {
        return Err(ParseError::TrailingBytes {
            offset: r.offset(),
            remaining: r.remaining(),
        });
    }

    let graph = Graph::from_nodes(nodes);
    graph.check_names()?;
    Ok(graph)
}

/// Encode a graph into its binary form; never fails
#[must_use]
pub fn save(graph: &Graph) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_bytes(&MAGIC);
    w.write_u16_le(FORMAT_MAJOR);
    w.write_u16_le(FORMAT_MINOR);
    w.write_len(graph.len());
    for node in graph {
        write_node(&mut w, node);
    }
    w.into_vec()
}

fn read_node(r: &mut Reader<'_>) -> Result<Node, ParseError> {
    let name = r.read_string()?;
    let op = r.read_string()?;

    let n_inputs = r.read_len()?;
    let mut inputs = Vec::with_capacity(n_inputs.min(r.remaining()));
    for _ in 0..n_inputs {
        let producer = r.read_string()?;
        let slot = r.read_uleb_u32()?;
        let control = r.read_flag()?;
        inputs.push(if control {
            InputRef::control(producer)
        } else {
            InputRef::with_slot(producer, slot)
        });
    }

    let n_attrs = r.read_len()?;
    let mut attrs = AttrMap::with_capacity(n_attrs.min(r.remaining()));
    for _ in 0..n_attrs {
        let key = r.read_string()?;
        let value = read_value(r, 0)?;
        attrs.insert(key, value);
    }

    Ok(Node {
        name,
        op,
        inputs,
        attrs,
    })
}

fn write_node(w: &mut Writer, node: &Node) {
    w.write_str(&node.name);
    w.write_str(&node.op);

    w.write_len(node.inputs.len());
    for input in &node.inputs {
        w.write_str(input.producer());
        w.write_uleb(u64::from(input.slot()));
        w.write_u8(u8::from(input.is_control()));
    }

    w.write_len(node.attrs.len());
    for (key, value) in &node.attrs {
        w.write_str(key);
        write_value(w, value);
    }
}

fn read_value(r: &mut Reader<'_>, depth: usize) -> Result<AttrValue, ParseError> {
    let offset = r.offset();
    let tag = r.read_u8()?;
    Ok(match tag {
        TAG_TYPE => AttrValue::Type(DataType::from_code(r.read_uleb_u32()?)),
        TAG_INT => AttrValue::Int(r.read_sleb()?),
        TAG_FLOAT => AttrValue::Float(f32::from_bits(r.read_u32_le()?)),
        TAG_BOOL => AttrValue::Bool(r.read_flag()?),
        TAG_BYTES => {
            let len = r.read_len()?;
            AttrValue::Bytes(r.read_bytes(len)?.to_vec())
        }
        TAG_SHAPE => {
            let rank = r.read_len()?;
            let mut dims = Vec::with_capacity(rank.min(r.remaining()));
            for _ in 0..rank {
                dims.push(if r.read_flag()? { Some(r.read_sleb()?) } else { None });
            }
            AttrValue::Shape(dims)
        }
        TAG_TENSOR => {
            let dtype = DataType::from_code(r.read_uleb_u32()?);
            let rank = r.read_len()?;
            let mut dims = Vec::with_capacity(rank.min(r.remaining()));
            for _ in 0..rank {
                dims.push(r.read_uleb()?);
            }
            let len = r.read_len()?;
            let content = r.read_bytes(len)?.to_vec();
            AttrValue::Tensor(TensorValue {
                dtype,
                dims,
                content,
            })
        }
        TAG_LIST => {
            if depth >= MAX_LIST_DEPTH {
                return Err(ParseError::TooDeep { offset });
            }
            let len = r.read_len()?;
            let mut items = Vec::with_capacity(len.min(r.remaining()));
            for _ in 0..len {
                items.push(read_value(r, depth + 1)?);
            }
            AttrValue::List(items)
        }
        tag => return Err(ParseError::UnknownTag { tag, offset }),
    })
}

fn write_value(w: &mut Writer, value: &AttrValue) {
    match value {
        AttrValue::Type(dt) => {
            w.write_u8(TAG_TYPE);
            w.write_uleb(u64::from(dt.code()));
        }
        AttrValue::Int(v) => {
            w.write_u8(TAG_INT);
            w.write_sleb(*v);
        }
        AttrValue::Float(v) => {
            w.write_u8(TAG_FLOAT);
            w.write_u32_le(v.to_bits());
        }
        AttrValue::Bool(v) => {
            w.write_u8(TAG_BOOL);
            w.write_u8(u8::from(*v));
        }
        AttrValue::Bytes(bytes) => {
            w.write_u8(TAG_BYTES);
            w.write_len(bytes.len());
            w.write_bytes(bytes);
        }
        AttrValue::Shape(dims) => {
            w.write_u8(TAG_SHAPE);
            w.write_len(dims.len());
            for dim in dims {
                match dim {
                    Some(d) => {
                        w.write_u8(1);
                        w.write_sleb(*d);
                    }
                    None => w.write_u8(0),
                }
            }
        }
        AttrValue::Tensor(t) => {
            w.write_u8(TAG_TENSOR);
            w.write_uleb(u64::from(t.dtype.code()));
            w.write_len(t.dims.len());
            for dim in &t.dims {
                w.write_uleb(*dim);
            }
            w.write_len(t.content.len());
            w.write_bytes(&t.content);
        }
        AttrValue::List(items) => {
            w.write_u8(TAG_LIST);
            w.write_len(items.len());
            for item in items {
                write_value(w, item);
            }
        }
    }
}

/// Bounds-checked cursor over the input
#[derive(Debug, Clone)]
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(ParseError::OutOfBounds {
                offset: self.offset,
            })?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(ParseError::UnexpectedEof {
                offset: self.bytes.len(),
            })?;
        self.offset = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16_le(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32_le(&mut self) -> Result<u32, ParseError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_flag(&mut self) -> Result<bool, ParseError> {
        let offset = self.offset;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(ParseError::InvalidFlag { value, offset }),
        }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        self.take(len)
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        let len = self.read_len()?;
        let offset = self.offset;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ParseError::InvalidUtf8 { offset })
    }

    /// Unsigned LEB128; rejects overlong and non-canonical encodings so each
    /// value has a single byte form
    fn read_uleb(&mut self) -> Result<u64, ParseError> {
        let start = self.offset;
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let low = u64::from(byte & 0x7f);
            if shift == 63 && low > 1 {
                return Err(ParseError::InvalidVarint { offset: start });
            }
            result |= low << shift;
            if byte & 0x80 == 0 {
                if byte == 0 && shift > 0 {
                    return Err(ParseError::InvalidVarint { offset: start });
                }
                return Ok(result);
            }
            shift += 7;
            if shift > 63 {
                return Err(ParseError::InvalidVarint { offset: start });
            }
        }
    }

    /// Signed LEB128
    fn read_sleb(&mut self) -> Result<i64, ParseError> {
        let start = self.offset;
        let mut result: i64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte != 0x00 && byte != 0x7f {
                return Err(ParseError::InvalidVarint { offset: start });
            }
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
            if shift > 63 {
                return Err(ParseError::InvalidVarint { offset: start });
            }
        }
    }

    fn read_uleb_u32(&mut self) -> Result<u32, ParseError> {
        let offset = self.offset;
        let v = self.read_uleb()?;
        u32::try_from(v).map_err(|_| ParseError::OutOfBounds { offset })
    }

    fn read_len(&mut self) -> Result<usize, ParseError> {
        let offset = self.offset;
        let v = self.read_uleb()?;
        usize::try_from(v).map_err(|_| ParseError::OutOfBounds { offset })
    }
}

/// Append-only output buffer
#[derive(Debug, Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self::default()
    }

    fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn write_u16_le(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u32_le(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.write_bytes(s.as_bytes());
    }

    fn write_len(&mut self, len: usize) {
        // usize always fits in u64 on supported targets
        self.write_uleb(len as u64);
    }

    fn write_uleb(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.bytes.push(byte);
                return;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    fn write_sleb(&mut self, mut v: i64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
            if done {
                self.bytes.push(byte);
                return;
            }
            self.bytes.push(byte | 0x80);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    fn sample() -> Graph {
        Graph::from_nodes(vec![
            Node::new("images", "Placeholder")
                .attr("dtype", AttrValue::Type(DataType::Float32))
                .attr("shape", AttrValue::Shape(vec![Some(1), None, None, Some(3)])),
            Node::new("axis", "Const").attr(
                "value",
                AttrValue::Tensor(TensorValue {
                    dtype: DataType::Int32,
                    dims: vec![],
                    content: 3i32.to_le_bytes().to_vec(),
                }),
            ),
            Node::new("conv", "Conv2D")
                .inputs(["images", "^axis"])
                .attr("strides", AttrValue::ints(&[1, 2, 2, 1]))
                .attr("padding", AttrValue::text("SAME"))
                .attr("use_cudnn_on_gpu", AttrValue::Bool(true))
                .attr("epsilon", AttrValue::Float(1e-3))
                .attr("offset", AttrValue::Int(-129)),
            Node::new("split", "Split").inputs(["axis", "conv"]),
            Node::new("out", "Identity").input("split:1"),
        ])
    }

    #[test]
    fn round_trip_is_exact() {
        let g = sample();
        let bytes = save(&g);
        let back = load(&bytes).unwrap();
        assert_eq!(back, g);
        assert_eq!(save(&back), bytes);
    }

    #[test]
    fn varints_round_trip_extremes() {
        for v in [0u64, 1, 127, 128, 300, u64::from(u32::MAX), u64::MAX] {
            let mut w = Writer::new();
            w.write_uleb(v);
            let bytes = w.into_vec();
            assert_eq!(Reader::new(&bytes).read_uleb().unwrap(), v);
        }
        for v in [0i64, -1, 63, 64, -64, -65, i64::MIN, i64::MAX] {
            let mut w = Writer::new();
            w.write_sleb(v);
            let bytes = w.into_vec();
            assert_eq!(Reader::new(&bytes).read_sleb().unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn overlong_uleb_is_rejected() {
        // 1 encoded with a redundant continuation byte
        let bytes = [0x81, 0x00];
        assert!(matches!(
            Reader::new(&bytes).read_uleb(),
            Err(ParseError::InvalidVarint { offset: 0 })
        ));
    }

    #[test]
    fn bad_magic() {
        assert_eq!(load(b"NOPE\x01\x00\x00\x00\x00"), Err(ParseError::BadMagic));
    }

    #[test]
    fn unsupported_major_version() {
        let mut bytes = save(&Graph::new());
        bytes[4] = 9;
        assert_eq!(
            load(&bytes),
            Err(ParseError::UnsupportedVersion { major: 9, minor: 0 })
        );
    }

    #[test]
    fn every_truncation_fails() {
        let bytes = save(&sample());
        for cut in 0..bytes.len() {
            assert!(load(&bytes[..cut]).is_err(), "prefix of {cut} bytes decoded");
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = save(&sample());
        let len = bytes.len();
        bytes.push(0);
        assert_eq!(
            load(&bytes),
            Err(ParseError::TrailingBytes {
                offset: len,
                remaining: 1
            })
        );
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let g = Graph::from_nodes(vec![Node::new("a", "Const").attr("k", AttrValue::Int(1))]);
        let mut bytes = save(&g);
        // tag byte sits right before the single-byte sleb payload
        let tag_at = bytes.len() - 2;
        bytes[tag_at] = 42;
        assert_eq!(
            load(&bytes),
            Err(ParseError::UnknownTag {
                tag: 42,
                offset: tag_at
            })
        );
    }

    #[test]
    fn duplicate_names_are_malformed() {
        let g = Graph::from_nodes(vec![Node::new("a", "Const"), Node::new("a", "Const")]);
        assert_eq!(
            load(&save(&g)),
            Err(ParseError::Malformed(GraphError::DuplicateNode("a".to_string())))
        );
    }

    #[test]
    fn empty_producer_is_malformed() {
        let g = Graph::from_nodes(vec![Node::new("a", "Relu").input("")]);
        assert_eq!(
            load(&save(&g)),
            Err(ParseError::Malformed(GraphError::InvalidInputRef(String::new())))
        );
    }

    #[test]
    fn huge_count_does_not_preallocate() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&FORMAT_MAJOR.to_le_bytes());
        bytes.extend_from_slice(&FORMAT_MINOR.to_le_bytes());
        bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert!(matches!(load(&bytes), Err(ParseError::UnexpectedEof { .. })));
    }

    fn nested_list_bytes(depth: usize) -> (Vec<u8>, usize) {
        let mut w = Writer::new();
        w.write_bytes(&MAGIC);
        w.write_u16_le(FORMAT_MAJOR);
        w.write_u16_le(FORMAT_MINOR);
        w.write_len(1);
        w.write_str("a");
        w.write_str("Const");
        w.write_len(0);
        w.write_len(1);
        w.write_str("k");
        let mut bytes = w.into_vec();
        let first = bytes.len();
        for _ in 0..depth {
            bytes.extend_from_slice(&[TAG_LIST, 1]);
        }
        bytes.extend_from_slice(&[TAG_INT, 0]);
        (bytes, first)
    }

    #[test]
    fn list_nesting_up_to_the_limit_loads() {
        let (bytes, _) = nested_list_bytes(MAX_LIST_DEPTH);
        let g = load(&bytes).unwrap();

        let mut value = g.get("a").unwrap().get_attr("k").unwrap();
        let mut depth = 0;
        while let AttrValue::List(items) = value {
            value = &items[0];
            depth += 1;
        }
        assert_eq!(depth, MAX_LIST_DEPTH);
        assert_eq!(value, &AttrValue::Int(0));
        assert_eq!(save(&g), bytes);
    }

    #[test]
    fn deep_list_nesting_is_rejected() {
        for depth in [MAX_LIST_DEPTH + 1, 20_000] {
            let (bytes, first) = nested_list_bytes(depth);
            assert_eq!(
                load(&bytes),
                Err(ParseError::TooDeep {
                    offset: first + 2 * MAX_LIST_DEPTH
                })
            );
        }
    }
}
