//! Numeric arrays inside msgpack bodies.
//!
//! Servers pack arrays as a map carrying the element type, the shape and
//! the raw element bytes:
//!
//! ```text
//! { "nd": true, "type": "<f8", "kind": "", "shape": [2, 3], "data": <bin> }
//! ```
//!
//! `nd: false` marks a single scalar with the same layout and no shape.
//! Keys may be msgpack strings or binaries. Decoding yields nested JSON
//! arrays following `shape`, with every element converted exactly.

use rmpv::Value as MsgValue;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ErrorKind, Result};

/// Upper bound on empty arrays produced by a shape with a zero dimension.
const MAX_EMPTY_ARRAYS: usize = 1 << 16;

/// Element kind of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DTypeKind {
    Bool,
    Int,
    UInt,
    Float,
}

/// Element type: kind, width in bytes and byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DType {
    pub kind: DTypeKind,
    pub size: usize,
    pub big_endian: bool,
}

impl DType {
    pub const F8: DType = DType::little(DTypeKind::Float, 8);
    pub const I8: DType = DType::little(DTypeKind::Int, 8);

    const fn little(kind: DTypeKind, size: usize) -> Self {
        Self {
            kind,
            size,
            big_endian: false,
        }
    }

    fn is_supported(&self) -> bool {
        match self.kind {
            DTypeKind::Bool => self.size == 1,
            DTypeKind::Int | DTypeKind::UInt => matches!(self.size, 1 | 2 | 4 | 8),
            DTypeKind::Float => matches!(self.size, 4 | 8),
        }
    }

    /// Decode one element of exactly `self.size` bytes.
    fn decode(&self, raw: &[u8]) -> Value {
        let mut buf = [0u8; 8];
        if self.big_endian {
            buf[8 - self.size..].copy_from_slice(raw);
            buf.reverse();
        } else {
            buf[..self.size].copy_from_slice(raw);
        }
        // buf now holds the element little-endian, zero padded
        let bits = u64::from_le_bytes(buf);

        match self.kind {
            DTypeKind::Bool => Value::Bool(bits != 0),
            DTypeKind::UInt => Value::Number(bits.into()),
            DTypeKind::Int => {
                let shift = 64 - 8 * self.size as u32;
                let signed = ((bits << shift) as i64) >> shift;
                Value::Number(signed.into())
            }
            DTypeKind::Float => {
                let float = if self.size == 4 {
                    f64::from(f32::from_bits(bits as u32))
                } else {
                    f64::from_bits(bits)
                };
                Number::from_f64(float).map_or(Value::Null, Value::Number)
            }
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = if self.size == 1 {
            '|'
        } else if self.big_endian {
            '>'
        } else {
            '<'
        };
        let kind = match self.kind {
            DTypeKind::Bool => 'b',
            DTypeKind::Int => 'i',
            DTypeKind::UInt => 'u',
            DTypeKind::Float => 'f',
        };
        write!(f, "{order}{kind}{}", self.size)
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::new(ErrorKind::Array(format!("unsupported dtype {s:?}")));

        let (big_endian, rest) = match s.as_bytes().first() {
            Some(b'<') | Some(b'|') => (false, &s[1..]),
            Some(b'>') => (true, &s[1..]),
            Some(b'=') => (cfg!(target_endian = "big"), &s[1..]),
            _ => (false, s),
        };
        let mut chars = rest.chars();
        let kind = match chars.next() {
            Some('b') => DTypeKind::Bool,
            Some('i') => DTypeKind::Int,
            Some('u') => DTypeKind::UInt,
            Some('f') => DTypeKind::Float,
            _ => return Err(invalid()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| invalid())?;

        let dtype = DType {
            kind,
            size,
            big_endian,
        };
        if dtype.is_supported() {
            Ok(dtype)
        } else {
            Err(invalid())
        }
    }
}

/// A typed, shaped block of raw array elements.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl NdArray {
    /// Create an array from raw element bytes. A scalar has an empty shape.
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        if !dtype.is_supported() {
            return Err(Error::new(ErrorKind::Array(format!("unsupported dtype {dtype}"))));
        }
        let too_large = || Error::new(ErrorKind::Array(format!("shape {shape:?} is too large")));

        let count = product(&shape).ok_or_else(too_large)?;
        let needed = count.checked_mul(dtype.size).ok_or_else(too_large)?;
        if needed != data.len() {
            return Err(Error::new(ErrorKind::Array(format!(
                "shape {shape:?} of {dtype} needs {needed} bytes, got {}",
                data.len()
            ))));
        }
        // A zero dimension leaves every enclosing array empty, but they are
        // still materialized.
        if count == 0 {
            let outer: Vec<usize> = shape.iter().copied().take_while(|&d| d != 0).collect();
            if product(&outer).is_none_or(|n| n > MAX_EMPTY_ARRAYS) {
                return Err(too_large());
            }
        }
        Ok(Self { dtype, shape, data })
    }

    /// Little-endian float64 array.
    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(DType::F8, shape, data)
    }

    /// Little-endian int64 array.
    pub fn from_i64(shape: Vec<usize>, values: &[i64]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(DType::I8, shape, data)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Encode as the msgpack map servers emit.
    pub fn to_msgpack(&self) -> MsgValue {
        let key = |k: &str| MsgValue::Binary(k.as_bytes().to_vec());
        let is_array = !self.shape.is_empty();

        let mut entries = vec![
            (key("nd"), MsgValue::Boolean(is_array)),
            (key("type"), MsgValue::from(self.dtype.to_string())),
            (key("kind"), MsgValue::Binary(Vec::new())),
        ];
        if is_array {
            let shape = self.shape.iter().map(|&d| MsgValue::from(d as u64)).collect();
            entries.push((key("shape"), MsgValue::Array(shape)));
        }
        entries.push((key("data"), MsgValue::Binary(self.data.clone())));
        MsgValue::Map(entries)
    }

    /// Expand into nested JSON arrays (or a single value for a scalar).
    pub fn to_json(&self) -> Value {
        let elements: Vec<Value> = self
            .data
            .chunks_exact(self.dtype.size)
            .map(|raw| self.dtype.decode(raw))
            .collect();
        nest(&elements, &self.shape)
    }

    fn from_msgpack_map(map: &[(MsgValue, MsgValue)], is_array: bool) -> Result<Self> {
        let dtype = match field(map, "type") {
            Some(MsgValue::String(s)) => s.as_str().unwrap_or_default().parse()?,
            Some(MsgValue::Binary(b)) => String::from_utf8_lossy(b).parse()?,
            _ => return Err(Error::new(ErrorKind::Array("missing dtype".into()))),
        };
        let data = match field(map, "data") {
            Some(MsgValue::Binary(b)) => b.clone(),
            _ => return Err(Error::new(ErrorKind::Array("missing element data".into()))),
        };
        let shape = if is_array {
            match field(map, "shape") {
                Some(MsgValue::Array(dims)) => dims
                    .iter()
                    .map(|d| {
                        d.as_u64()
                            .and_then(|d| usize::try_from(d).ok())
                            .ok_or_else(|| {
                                Error::new(ErrorKind::Array(format!("invalid dimension {d}")))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => return Err(Error::new(ErrorKind::Array("missing shape".into()))),
            }
        } else {
            Vec::new()
        };
        Self::new(dtype, shape, data)
    }
}

/// Element count of `shape`, or `None` on overflow.
fn product(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// `elements` must hold exactly `product(shape)` values.
fn nest(elements: &[Value], shape: &[usize]) -> Value {
    match shape.split_first() {
        None => elements.first().cloned().unwrap_or(Value::Null),
        Some((&len, rest)) => {
            if elements.is_empty() {
                return Value::Array((0..len).map(|_| nest(&[], rest)).collect());
            }
            Value::Array(
                elements
                    .chunks_exact(elements.len() / len)
                    .map(|block| nest(block, rest))
                    .collect(),
            )
        }
    }
}

fn key_matches(key: &MsgValue, name: &str) -> bool {
    match key {
        MsgValue::String(s) => s.as_bytes() == name.as_bytes(),
        MsgValue::Binary(b) => b.as_slice() == name.as_bytes(),
        _ => false,
    }
}

fn field<'a>(map: &'a [(MsgValue, MsgValue)], name: &str) -> Option<&'a MsgValue> {
    map.iter().find(|(k, _)| key_matches(k, name)).map(|(_, v)| v)
}

fn key_to_string(key: MsgValue) -> Result<String> {
    Ok(match key {
        MsgValue::String(s) => match s.into_str() {
            Some(s) => s,
            None => return Err(Error::new(ErrorKind::Msgpack("map key is not UTF-8".into()))),
        },
        MsgValue::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
        other => other.to_string(),
    })
}

/// Convert a decoded msgpack tree into a JSON tree, expanding arrays.
pub(crate) fn to_json(value: MsgValue) -> Result<Value> {
    Ok(match value {
        MsgValue::Nil => Value::Null,
        MsgValue::Boolean(b) => Value::Bool(b),
        MsgValue::Integer(i) => match (i.as_u64(), i.as_i64()) {
            (Some(u), _) => Value::Number(u.into()),
            (None, Some(s)) => Value::Number(s.into()),
            (None, None) => Value::Null,
        },
        MsgValue::F32(f) => Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number),
        MsgValue::F64(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        MsgValue::String(s) => Value::String(match s.into_str() {
            Some(s) => s,
            None => return Err(Error::new(ErrorKind::Msgpack("string is not UTF-8".into()))),
        }),
        MsgValue::Binary(b) => Value::Array(b.into_iter().map(Value::from).collect()),
        MsgValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect::<Result<_>>()?)
        }
        MsgValue::Map(entries) => {
            if let Some(MsgValue::Boolean(is_array)) = field(&entries, "nd") {
                return Ok(NdArray::from_msgpack_map(&entries, *is_array)?.to_json());
            }
            let mut object = Map::with_capacity(entries.len());
            for (k, v) in entries {
                object.insert(key_to_string(k)?, to_json(v)?);
            }
            Value::Object(object)
        }
        MsgValue::Ext(kind, data) => serde_json::json!({
            "ext_type": kind,
            "data": data,
        }),
    })
}
