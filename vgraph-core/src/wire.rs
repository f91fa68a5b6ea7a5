//! Binary codec for `VectorGraph` messages.
//!
//! The payload is the protobuf wire encoding of the `VectorGraph` message:
//!
//! ```text
//! VectorGraph   := version(1) name(2) type(3) vertexCount(4) edgeCount(5)
//!                  edges(6)* string(7)* uint32(8)* double(9)* int32(10)*
//!                  int64(11)* float(12)* bool(13)*
//! Edge          := src(1) dst(2)
//! AttrVector    := name(1) target(2) values(3)*
//! ```
//!
//! Repeated scalars are accepted both packed and unpacked; unknown fields
//! are skipped. The encoder always writes packed scalars.

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::types::{AttributeTarget, ColumnGroups, RawColumn, Values, VectorGraph};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Versions this codec knows how to load.
pub const SUPPORTED_VERSIONS: &[u32] = &[0, 1];

/// Errors raised while decoding a wire payload.
#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("Unexpected end of input while reading {context}")]
    Truncated { context: &'static str },

    #[error("Malformed varint")]
    BadVarint,

    #[error("Unsupported wire type {wire_type} for field {field}")]
    BadWireType { field: u64, wire_type: u8 },

    #[error("Invalid UTF-8 in {context}")]
    InvalidUtf8 { context: &'static str },

    #[error("Unknown attribute target {0}")]
    UnknownTarget(u64),

    #[error("Unsupported VectorGraph version {0}")]
    UnsupportedVersion(u32),

    #[error("Edge list has {actual} entries but edgeCount is {declared}")]
    EdgeCountMismatch { declared: u32, actual: usize },

    #[error("Edge {index} ({src} -> {dst}) references a vertex outside [0, {vertex_count})")]
    EdgeOutOfRange {
        index: usize,
        src: u32,
        dst: u32,
        vertex_count: u32,
    },

    #[error("Column '{name}' has {actual} values but its {target} count is {expected}")]
    ColumnLength {
        name: String,
        target: AttributeTarget,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Element kind of an attribute vector group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VectorKind {
    String,
    UInt32,
    Int32,
    Int64,
    Float,
    Double,
    Bool,
}

impl VectorKind {
    fn from_field(field: u64) -> Option<Self> {
        Some(match field {
            7 => VectorKind::String,
            8 => VectorKind::UInt32,
            9 => VectorKind::Double,
            10 => VectorKind::Int32,
            11 => VectorKind::Int64,
            12 => VectorKind::Float,
            13 => VectorKind::Bool,
            _ => return None,
        })
    }

    fn field(&self) -> u64 {
        match self {
            VectorKind::String => 7,
            VectorKind::UInt32 => 8,
            VectorKind::Double => 9,
            VectorKind::Int32 => 10,
            VectorKind::Int64 => 11,
            VectorKind::Float => 12,
            VectorKind::Bool => 13,
        }
    }

    fn scalar_wire_type(&self) -> u8 {
        match self {
            VectorKind::String => WIRE_LEN,
            VectorKind::Float => WIRE_FIXED32,
            VectorKind::Double => WIRE_FIXED64,
            _ => WIRE_VARINT,
        }
    }
}

/// Decode a wire payload and check its structural invariants.
pub fn decode(mut buf: &[u8]) -> Result<VectorGraph> {
    let mut vg = VectorGraph::default();

    while buf.has_remaining() {
        let (field, wire_type) = read_key(&mut buf)?;
        match (field, wire_type) {
            (1, WIRE_VARINT) => vg.version = read_varint(&mut buf)? as u32,
            (2, WIRE_LEN) => vg.name = read_string(&mut buf, "graph name")?,
            (3, WIRE_VARINT) => vg.graph_type = read_varint(&mut buf)? as u32,
            (4, WIRE_VARINT) => vg.vertex_count = read_varint(&mut buf)? as u32,
            (5, WIRE_VARINT) => vg.edge_count = read_varint(&mut buf)? as u32,
            (6, WIRE_LEN) => {
                let mut msg = read_len_delimited(&mut buf, "edge")?;
                vg.edges.push(decode_edge(&mut msg)?);
            }
            (f, WIRE_LEN) => match VectorKind::from_field(f) {
                Some(kind) => {
                    let mut msg = read_len_delimited(&mut buf, "attribute vector")?;
                    let column = decode_vector(&mut msg, kind)?;
                    group_mut(&mut vg.columns, kind).push(column);
                }
                None => skip_field(&mut buf, f, WIRE_LEN)?,
            },
            (f, wt) => skip_field(&mut buf, f, wt)?,
        }
    }

    validate(&vg)?;
    Ok(vg)
}

/// Check the structural invariants of a decoded graph.
///
/// Empty columns are exempt from the length check; loaders treat them as
/// absent. Version 0 graphs only check the groups version 0 loads.
pub fn validate(vg: &VectorGraph) -> Result<()> {
    if vg.edges.len() != vg.edge_count as usize {
        return Err(DecodeError::EdgeCountMismatch {
            declared: vg.edge_count,
            actual: vg.edges.len(),
        });
    }

    for (index, &(src, dst)) in vg.edges.iter().enumerate() {
        if src >= vg.vertex_count || dst >= vg.vertex_count {
            return Err(DecodeError::EdgeOutOfRange {
                index,
                src,
                dst,
                vertex_count: vg.vertex_count,
            });
        }
    }

    let columns: Vec<&RawColumn> = match vg.version {
        0 => vg.columns.v0().collect(),
        _ => vg.columns.v1().collect(),
    };
    for column in columns {
        if column.values.is_empty() {
            continue;
        }
        let expected = match column.target {
            AttributeTarget::Vertex => vg.vertex_count as usize,
            AttributeTarget::Edge => vg.edge_count as usize,
        };
        if column.values.len() != expected {
            return Err(DecodeError::ColumnLength {
                name: column.name.clone(),
                target: column.target,
                expected,
                actual: column.values.len(),
            });
        }
    }

    Ok(())
}

fn group_mut(groups: &mut ColumnGroups, kind: VectorKind) -> &mut Vec<RawColumn> {
    match kind {
        VectorKind::String => &mut groups.string,
        VectorKind::UInt32 => &mut groups.uint32,
        VectorKind::Int32 => &mut groups.int32,
        VectorKind::Int64 => &mut groups.int64,
        VectorKind::Float => &mut groups.float,
        VectorKind::Double => &mut groups.double,
        VectorKind::Bool => &mut groups.bool,
    }
}

fn decode_edge(buf: &mut &[u8]) -> Result<(u32, u32)> {
    let mut src = 0;
    let mut dst = 0;
    while buf.has_remaining() {
        match read_key(buf)? {
            (1, WIRE_VARINT) => src = read_varint(buf)? as u32,
            (2, WIRE_VARINT) => dst = read_varint(buf)? as u32,
            (f, wt) => skip_field(buf, f, wt)?,
        }
    }
    Ok((src, dst))
}

fn decode_vector(buf: &mut &[u8], kind: VectorKind) -> Result<RawColumn> {
    let mut name = String::new();
    let mut target = AttributeTarget::Vertex;
    let mut numbers = Vec::new();
    let mut strings = Vec::new();
    let mut bools = Vec::new();

    while buf.has_remaining() {
        let (field, wire_type) = read_key(buf)?;
        match (field, wire_type) {
            (1, WIRE_LEN) => name = read_string(buf, "attribute name")?,
            (2, WIRE_VARINT) => {
                target = match read_varint(buf)? {
                    0 => AttributeTarget::Vertex,
                    1 => AttributeTarget::Edge,
                    other => return Err(DecodeError::UnknownTarget(other)),
                }
            }
            (3, WIRE_LEN) if kind == VectorKind::String => {
                strings.push(read_string(buf, "string value")?);
            }
            (3, WIRE_LEN) => {
                let mut packed = read_len_delimited(buf, "packed values")?;
                while packed.has_remaining() {
                    read_scalar(&mut packed, kind, &mut numbers, &mut bools)?;
                }
            }
            (3, wt) if wt == kind.scalar_wire_type() => {
                read_scalar(buf, kind, &mut numbers, &mut bools)?;
            }
            (f, wt) => skip_field(buf, f, wt)?,
        }
    }

    let values = match kind {
        VectorKind::String => Values::Text(strings),
        VectorKind::Bool => Values::Bool(bools),
        _ => Values::Number(numbers),
    };
    Ok(RawColumn {
        name,
        target,
        values,
    })
}

fn read_scalar(
    buf: &mut &[u8],
    kind: VectorKind,
    numbers: &mut Vec<f64>,
    bools: &mut Vec<bool>,
) -> Result<()> {
    match kind {
        VectorKind::UInt32 => numbers.push(read_varint(buf)? as u32 as f64),
        VectorKind::Int32 => numbers.push(read_varint(buf)? as i64 as i32 as f64),
        VectorKind::Int64 => numbers.push(read_varint(buf)? as i64 as f64),
        VectorKind::Bool => bools.push(read_varint(buf)? != 0),
        VectorKind::Float => {
            ensure(buf, 4, "float value")?;
            numbers.push(buf.get_f32_le() as f64);
        }
        VectorKind::Double => {
            ensure(buf, 8, "double value")?;
            numbers.push(buf.get_f64_le());
        }
        VectorKind::String => unreachable!("string values are length-delimited"),
    }
    Ok(())
}

fn ensure(buf: &&[u8], needed: usize, context: &'static str) -> Result<()> {
    if buf.remaining() < needed {
        Err(DecodeError::Truncated { context })
    } else {
        Ok(())
    }
}

fn read_varint(buf: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        ensure(buf, 1, "varint")?;
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DecodeError::BadVarint)
}

fn read_key(buf: &mut &[u8]) -> Result<(u64, u8)> {
    let key = read_varint(buf)?;
    Ok((key >> 3, (key & 0x7) as u8))
}

fn read_len_delimited<'a>(buf: &mut &'a [u8], context: &'static str) -> Result<&'a [u8]> {
    let len = read_varint(buf)? as usize;
    ensure(buf, len, context)?;
    let slice: &'a [u8] = buf;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

fn read_string(buf: &mut &[u8], context: &'static str) -> Result<String> {
    let raw = read_len_delimited(buf, context)?;
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8 { context })
}

fn skip_field(buf: &mut &[u8], field: u64, wire_type: u8) -> Result<()> {
    match wire_type {
        WIRE_VARINT => {
            read_varint(buf)?;
        }
        WIRE_FIXED64 => {
            ensure(buf, 8, "fixed64 field")?;
            buf.advance(8);
        }
        WIRE_LEN => {
            read_len_delimited(buf, "length-delimited field")?;
        }
        WIRE_FIXED32 => {
            ensure(buf, 4, "fixed32 field")?;
            buf.advance(4);
        }
        _ => return Err(DecodeError::BadWireType { field, wire_type }),
    }
    Ok(())
}

/// Encode a graph into its wire representation.
pub fn encode(vg: &VectorGraph) -> Vec<u8> {
    let mut out = Vec::new();

    put_key(&mut out, 1, WIRE_VARINT);
    put_varint(&mut out, u64::from(vg.version));
    if !vg.name.is_empty() {
        put_key(&mut out, 2, WIRE_LEN);
        put_bytes(&mut out, vg.name.as_bytes());
    }
    put_key(&mut out, 3, WIRE_VARINT);
    put_varint(&mut out, u64::from(vg.graph_type));
    put_key(&mut out, 4, WIRE_VARINT);
    put_varint(&mut out, u64::from(vg.vertex_count));
    put_key(&mut out, 5, WIRE_VARINT);
    put_varint(&mut out, u64::from(vg.edge_count));

    for &(src, dst) in &vg.edges {
        let mut edge = Vec::with_capacity(8);
        put_key(&mut edge, 1, WIRE_VARINT);
        put_varint(&mut edge, u64::from(src));
        put_key(&mut edge, 2, WIRE_VARINT);
        put_varint(&mut edge, u64::from(dst));
        put_key(&mut out, 6, WIRE_LEN);
        put_bytes(&mut out, &edge);
    }

    let groups = [
        (VectorKind::String, &vg.columns.string),
        (VectorKind::UInt32, &vg.columns.uint32),
        (VectorKind::Double, &vg.columns.double),
        (VectorKind::Int32, &vg.columns.int32),
        (VectorKind::Int64, &vg.columns.int64),
        (VectorKind::Float, &vg.columns.float),
        (VectorKind::Bool, &vg.columns.bool),
    ];
    for (kind, columns) in groups {
        for column in columns {
            put_key(&mut out, kind.field(), WIRE_LEN);
            put_bytes(&mut out, &encode_vector(column, kind));
        }
    }

    out
}

fn encode_vector(column: &RawColumn, kind: VectorKind) -> Vec<u8> {
    let mut msg = Vec::new();
    put_key(&mut msg, 1, WIRE_LEN);
    put_bytes(&mut msg, column.name.as_bytes());
    put_key(&mut msg, 2, WIRE_VARINT);
    put_varint(&mut msg, column.target.as_wire());

    match &column.values {
        Values::Text(strings) => {
            for s in strings {
                put_key(&mut msg, 3, WIRE_LEN);
                put_bytes(&mut msg, s.as_bytes());
            }
        }
        Values::Number(numbers) => {
            let mut packed = Vec::new();
            for &n in numbers {
                match kind {
                    VectorKind::Float => packed.put_f32_le(n as f32),
                    VectorKind::Double => packed.put_f64_le(n),
                    VectorKind::Int32 | VectorKind::Int64 => {
                        put_varint(&mut packed, n as i64 as u64)
                    }
                    _ => put_varint(&mut packed, n as u64),
                }
            }
            put_key(&mut msg, 3, WIRE_LEN);
            put_bytes(&mut msg, &packed);
        }
        Values::Bool(bools) => {
            let mut packed = Vec::with_capacity(bools.len());
            for &b in bools {
                packed.put_u8(u8::from(b));
            }
            put_key(&mut msg, 3, WIRE_LEN);
            put_bytes(&mut msg, &packed);
        }
    }
    msg
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.put_u8(value as u8);
}

fn put_key(out: &mut Vec<u8>, field: u64, wire_type: u8) {
    put_varint(out, (field << 3) | u64::from(wire_type));
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_varint(out, bytes.len() as u64);
    out.put_slice(bytes);
}
