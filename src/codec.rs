//! Compact binary value codec (MessagePack subset).
//!
//! Result records only ever carry nil, booleans, integers, floats, strings and
//! arrays, so that is all this module reads. Maps, binary blobs and extension
//! types (timestamps included) are rejected rather than skipped. All
//! multi-byte quantities are big-endian.

use crate::error::{DecodeError, Result};

/// Deepest array nesting accepted by [`read_value`].
pub const MAX_DEPTH: usize = 16;

/// A decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Every integer family (fixint, uint8..64, int8..64) lands here.
    Int(i64),
    /// float32 values are widened on read.
    Float(f64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    /// Short wire-type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer or float, normalised to `f64`.
    ///
    /// Some encoders emit whole-number floats as integers, so numeric fields
    /// accept both.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Decode exactly one value spanning all of `data`.
pub fn read_value(data: &[u8]) -> Result<Value> {
    let mut reader = Reader { data, pos: 0 };
    let value = reader.value(0)?;
    if reader.pos < data.len() {
        return Err(DecodeError::TrailingBytes {
            count: data.len() - reader.pos,
        });
    }
    Ok(value)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(DecodeError::UnexpectedEof {
                what,
                need: self.pos.saturating_add(n),
                got: self.data.len(),
            }),
        }
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64> {
        let b = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        let offset = self.pos;
        let marker = self.u8("value marker")?;
        match marker {
            0x00..=0x7F => Ok(Value::Int(i64::from(marker))),
            0x80..=0x8F | 0xDE | 0xDF => Err(DecodeError::UnsupportedFormat {
                what: "map",
                byte: marker,
            }),
            0x90..=0x9F => self.array(usize::from(marker & 0x0F), depth),
            0xA0..=0xBF => self.string(usize::from(marker & 0x1F)),
            0xC0 => Ok(Value::Nil),
            0xC1 => Err(DecodeError::ReservedFormat { byte: marker, offset }),
            0xC2 => Ok(Value::Bool(false)),
            0xC3 => Ok(Value::Bool(true)),
            0xC4..=0xC6 => Err(DecodeError::UnsupportedFormat {
                what: "binary",
                byte: marker,
            }),
            0xC7..=0xC9 | 0xD4..=0xD8 => Err(DecodeError::UnsupportedFormat {
                what: "extension",
                byte: marker,
            }),
            0xCA => Ok(Value::Float(f64::from(f32::from_bits(self.u32("float32")?)))),
            0xCB => Ok(Value::Float(f64::from_bits(self.u64("float64")?))),
            0xCC => Ok(Value::Int(i64::from(self.u8("uint8")?))),
            0xCD => Ok(Value::Int(i64::from(self.u16("uint16")?))),
            0xCE => Ok(Value::Int(i64::from(self.u32("uint32")?))),
            0xCF => {
                let raw = self.u64("uint64")?;
                i64::try_from(raw)
                    .map(Value::Int)
                    .map_err(|_| DecodeError::IntegerOverflow { value: raw })
            }
            0xD0 => Ok(Value::Int(i64::from(self.u8("int8")? as i8))),
            0xD1 => Ok(Value::Int(i64::from(self.u16("int16")? as i16))),
            0xD2 => Ok(Value::Int(i64::from(self.u32("int32")? as i32))),
            0xD3 => Ok(Value::Int(self.u64("int64")? as i64)),
            0xD9 => {
                let len = usize::from(self.u8("str8 length")?);
                self.string(len)
            }
            0xDA => {
                let len = usize::from(self.u16("str16 length")?);
                self.string(len)
            }
            0xDB => {
                let len = self.u32("str32 length")? as usize;
                self.string(len)
            }
            0xDC => {
                let len = usize::from(self.u16("array16 length")?);
                self.array(len, depth)
            }
            0xDD => {
                let len = self.u32("array32 length")? as usize;
                self.array(len, depth)
            }
            // Negative fixint
            0xE0..=0xFF => Ok(Value::Int(i64::from(marker as i8))),
        }
    }

    fn string(&mut self, len: usize) -> Result<Value> {
        let bytes = self.take(len, "string")?;
        Ok(Value::Str(String::from_utf8(bytes.to_vec())?))
    }

    fn array(&mut self, len: usize, depth: usize) -> Result<Value> {
        if depth >= MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep { limit: MAX_DEPTH });
        }
        // Every element takes at least one byte.
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(DecodeError::UnexpectedEof {
                what: "array elements",
                need: self.pos + len,
                got: self.data.len(),
            });
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.value(depth + 1)?);
        }
        Ok(Value::Array(items))
    }
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

pub fn write_nil(buf: &mut Vec<u8>) {
    buf.push(0xC0);
}

pub fn write_bool(buf: &mut Vec<u8>, val: bool) {
    buf.push(if val { 0xC3 } else { 0xC2 });
}

/// Write an integer using the smallest encoding that holds it.
pub fn write_int(buf: &mut Vec<u8>, val: i64) {
    if val >= 0 {
        let v = val as u64;
        if v <= 0x7F {
            buf.push(v as u8);
        } else if v <= u64::from(u8::MAX) {
            buf.push(0xCC);
            buf.push(v as u8);
        } else if v <= u64::from(u16::MAX) {
            buf.push(0xCD);
            buf.extend_from_slice(&(v as u16).to_be_bytes());
        } else if v <= u64::from(u32::MAX) {
            buf.push(0xCE);
            buf.extend_from_slice(&(v as u32).to_be_bytes());
        } else {
            buf.push(0xCF);
            buf.extend_from_slice(&v.to_be_bytes());
        }
    } else if val >= -32 {
        buf.push(val as i8 as u8);
    } else if val >= i64::from(i8::MIN) {
        buf.push(0xD0);
        buf.push(val as i8 as u8);
    } else if val >= i64::from(i16::MIN) {
        buf.push(0xD1);
        buf.extend_from_slice(&(val as i16).to_be_bytes());
    } else if val >= i64::from(i32::MIN) {
        buf.push(0xD2);
        buf.extend_from_slice(&(val as i32).to_be_bytes());
    } else {
        buf.push(0xD3);
        buf.extend_from_slice(&val.to_be_bytes());
    }
}

/// Write a float64.
pub fn write_float(buf: &mut Vec<u8>, val: f64) {
    buf.push(0xCB);
    buf.extend_from_slice(&val.to_bits().to_be_bytes());
}

pub fn write_str(buf: &mut Vec<u8>, val: &str) {
    let len = val.len();
    if len <= 31 {
        buf.push(0xA0 | len as u8);
    } else if len <= usize::from(u8::MAX) {
        buf.push(0xD9);
        buf.push(len as u8);
    } else if len <= usize::from(u16::MAX) {
        buf.push(0xDA);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(0xDB);
        buf.extend_from_slice(&(len as u32).to_be_bytes());
    }
    buf.extend_from_slice(val.as_bytes());
}

/// Write an array header; the caller writes `len` values after it.
pub fn write_array_len(buf: &mut Vec<u8>, len: usize) {
    if len <= 15 {
        buf.push(0x90 | len as u8);
    } else if len <= usize::from(u16::MAX) {
        buf.push(0xDC);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(0xDD);
        buf.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

pub fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Nil => write_nil(buf),
        Value::Bool(b) => write_bool(buf, *b),
        Value::Int(v) => write_int(buf, *v),
        Value::Float(v) => write_float(buf, *v),
        Value::Str(s) => write_str(buf, s),
        Value::Array(items) => {
            write_array_len(buf, items.len());
            for item in items {
                write_value(buf, item);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
