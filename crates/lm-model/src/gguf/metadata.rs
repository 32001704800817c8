use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::{ModelError, Result};

/// A single GGUF metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum GgufMetadataValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<GgufMetadataValue>),
}

// GGUF value type IDs.
const TYPE_U8: u32 = 0;
const TYPE_I8: u32 = 1;
const TYPE_U16: u32 = 2;
const TYPE_I16: u32 = 3;
const TYPE_U32: u32 = 4;
const TYPE_I32: u32 = 5;
const TYPE_F32: u32 = 6;
const TYPE_BOOL: u32 = 7;
const TYPE_STRING: u32 = 8;
const TYPE_ARRAY: u32 = 9;
const TYPE_U64: u32 = 10;
const TYPE_I64: u32 = 11;
const TYPE_F64: u32 = 12;

/// Deepest array-of-array nesting accepted when reading metadata.
const MAX_ARRAY_DEPTH: usize = 4;

impl GgufMetadataValue {
    /// Returns a human-readable name for the variant (used in error messages).
    fn type_name(&self) -> &'static str {
        match self {
            GgufMetadataValue::U8(_) => "U8",
            GgufMetadataValue::I8(_) => "I8",
            GgufMetadataValue::U16(_) => "U16",
            GgufMetadataValue::I16(_) => "I16",
            GgufMetadataValue::U32(_) => "U32",
            GgufMetadataValue::I32(_) => "I32",
            GgufMetadataValue::U64(_) => "U64",
            GgufMetadataValue::I64(_) => "I64",
            GgufMetadataValue::F32(_) => "F32",
            GgufMetadataValue::F64(_) => "F64",
            GgufMetadataValue::Bool(_) => "Bool",
            GgufMetadataValue::String(_) => "String",
            GgufMetadataValue::Array(_) => "Array",
        }
    }

    fn type_id(&self) -> u32 {
        match self {
            GgufMetadataValue::U8(_) => TYPE_U8,
            GgufMetadataValue::I8(_) => TYPE_I8,
            GgufMetadataValue::U16(_) => TYPE_U16,
            GgufMetadataValue::I16(_) => TYPE_I16,
            GgufMetadataValue::U32(_) => TYPE_U32,
            GgufMetadataValue::I32(_) => TYPE_I32,
            GgufMetadataValue::U64(_) => TYPE_U64,
            GgufMetadataValue::I64(_) => TYPE_I64,
            GgufMetadataValue::F32(_) => TYPE_F32,
            GgufMetadataValue::F64(_) => TYPE_F64,
            GgufMetadataValue::Bool(_) => TYPE_BOOL,
            GgufMetadataValue::String(_) => TYPE_STRING,
            GgufMetadataValue::Array(_) => TYPE_ARRAY,
        }
    }

    /// Integer value widened to u64, if this is a non-negative integer.
    fn as_u64(&self) -> Option<u64> {
        match *self {
            GgufMetadataValue::U8(v) => Some(v as u64),
            GgufMetadataValue::U16(v) => Some(v as u64),
            GgufMetadataValue::U32(v) => Some(v as u64),
            GgufMetadataValue::U64(v) => Some(v),
            GgufMetadataValue::I8(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I16(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I32(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Serialize the payload (without the leading type ID).
    pub(crate) fn write_payload(&self, writer: &mut impl Write) -> Result<()> {
        match self {
            GgufMetadataValue::U8(v) => writer.write_all(&[*v])?,
            GgufMetadataValue::I8(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::U16(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::I16(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::U32(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::I32(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::U64(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::I64(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::F32(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::F64(v) => writer.write_all(&v.to_le_bytes())?,
            GgufMetadataValue::Bool(v) => writer.write_all(&[*v as u8])?,
            GgufMetadataValue::String(s) => write_gguf_string(writer, s)?,
            GgufMetadataValue::Array(values) => {
                // Empty arrays carry no element to take a type from.
                let elem_type = values.first().map(|v| v.type_id()).unwrap_or(TYPE_U32);
                if let Some(bad) = values.iter().find(|v| v.type_id() != elem_type) {
                    return Err(ModelError::Other(format!(
                        "mixed array element types: {} in array of type id {}",
                        bad.type_name(),
                        elem_type
                    )));
                }
                writer.write_all(&elem_type.to_le_bytes())?;
                writer.write_all(&(values.len() as u64).to_le_bytes())?;
                for v in values {
                    v.write_payload(writer)?;
                }
            }
        }
        Ok(())
    }

    /// Serialize the type ID followed by the payload.
    pub(crate) fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&self.type_id().to_le_bytes())?;
        self.write_payload(writer)
    }
}

/// Collection of GGUF metadata key-value pairs.
#[derive(Debug, Default)]
pub struct GgufMetadata {
    pub entries: HashMap<String, GgufMetadataValue>,
}

impl GgufMetadata {
    fn lookup(&self, key: &str) -> Result<&GgufMetadataValue> {
        self.entries
            .get(key)
            .ok_or_else(|| ModelError::MissingKey(key.to_string()))
    }

    fn mismatch(key: &str, expected: &str, got: &GgufMetadataValue) -> ModelError {
        ModelError::TypeMismatch {
            key: key.to_string(),
            expected: expected.to_string(),
            got: got.type_name().to_string(),
        }
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Retrieve a string value by key.
    pub fn get_string(&self, key: &str) -> Result<&str> {
        match self.lookup(key)? {
            GgufMetadataValue::String(s) => Ok(s.as_str()),
            other => Err(Self::mismatch(key, "String", other)),
        }
    }

    /// Retrieve a non-negative integer of any GGUF integer width.
    ///
    /// Exporters disagree on whether sizes are written as u32 or u64, so
    /// every integer type is accepted as long as the value fits.
    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self.lookup(key)?;
        value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| Self::mismatch(key, "non-negative integer", value))
    }

    /// Retrieve a string array value by key.
    pub fn get_string_array(&self, key: &str) -> Result<Vec<String>> {
        match self.lookup(key)? {
            GgufMetadataValue::Array(arr) => arr
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    GgufMetadataValue::String(s) => Ok(s.clone()),
                    other => Err(Self::mismatch(&format!("{}[{}]", key, i), "String", other)),
                })
                .collect(),
            other => Err(Self::mismatch(key, "Array", other)),
        }
    }

    /// Parse `n_kv` key-value metadata entries from a reader.
    ///
    /// Each entry consists of:
    /// 1. A GGUF string key (u64 length + UTF-8 bytes).
    /// 2. A u32 value type ID.
    /// 3. The value payload, whose format depends on the type ID.
    pub fn parse_kv(reader: &mut impl Read, n_kv: u64) -> Result<GgufMetadata> {
        let mut entries = HashMap::new();
        for _ in 0..n_kv {
            let key = read_gguf_string(reader)?;
            let type_id = u32::from_le_bytes(read_bytes(reader)?);
            let value = read_value(reader, type_id, 0)?;
            entries.insert(key, value);
        }
        Ok(GgufMetadata { entries })
    }
}

pub(crate) fn read_bytes<const N: usize>(reader: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a GGUF string: u64 length followed by that many UTF-8 bytes.
pub(crate) fn read_gguf_string(reader: &mut impl Read) -> Result<String> {
    let len = u64::from_le_bytes(read_bytes(reader)?) as usize;
    let mut buf = Vec::new();
    // `take` keeps a corrupt length from allocating before the read fails.
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(ModelError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("string of {} bytes truncated after {}", len, buf.len()),
        )));
    }
    String::from_utf8(buf).map_err(|e| ModelError::Other(format!("invalid UTF-8 in string: {}", e)))
}

/// Write a GGUF string: u64 length followed by the UTF-8 bytes.
pub(crate) fn write_gguf_string(writer: &mut impl Write, s: &str) -> Result<()> {
    writer.write_all(&(s.len() as u64).to_le_bytes())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Read a single GGUF metadata value given its type ID.
///
/// `depth` counts the arrays enclosing the value.
fn read_value(reader: &mut impl Read, type_id: u32, depth: usize) -> Result<GgufMetadataValue> {
    use GgufMetadataValue as V;

    Ok(match type_id {
        TYPE_U8 => V::U8(read_bytes::<1>(reader)?[0]),
        TYPE_I8 => V::I8(i8::from_le_bytes(read_bytes(reader)?)),
        TYPE_U16 => V::U16(u16::from_le_bytes(read_bytes(reader)?)),
        TYPE_I16 => V::I16(i16::from_le_bytes(read_bytes(reader)?)),
        TYPE_U32 => V::U32(u32::from_le_bytes(read_bytes(reader)?)),
        TYPE_I32 => V::I32(i32::from_le_bytes(read_bytes(reader)?)),
        TYPE_F32 => V::F32(f32::from_le_bytes(read_bytes(reader)?)),
        TYPE_BOOL => V::Bool(read_bytes::<1>(reader)?[0] != 0),
        TYPE_STRING => V::String(read_gguf_string(reader)?),
        TYPE_ARRAY => {
            if depth >= MAX_ARRAY_DEPTH {
                return Err(ModelError::Other(format!(
                    "metadata arrays nested deeper than {} levels",
                    MAX_ARRAY_DEPTH
                )));
            }
            // u32 element type, u64 count, then count values of that type.
            let elem_type = u32::from_le_bytes(read_bytes(reader)?);
            let count = u64::from_le_bytes(read_bytes(reader)?) as usize;
            let mut values = Vec::new();
            for _ in 0..count {
                values.push(read_value(reader, elem_type, depth + 1)?);
            }
            V::Array(values)
        }
        TYPE_U64 => V::U64(u64::from_le_bytes(read_bytes(reader)?)),
        TYPE_I64 => V::I64(i64::from_le_bytes(read_bytes(reader)?)),
        TYPE_F64 => V::F64(f64::from_le_bytes(read_bytes(reader)?)),
        other => return Err(ModelError::UnsupportedGgufType(other)),
    })
}
