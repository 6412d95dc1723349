use crate::protocol::ProtocolError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Wire representation of one field of a message layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
    /// u16 length in code units, then UTF-16LE code units.
    Utf16,
    /// u16 length in bytes, then UTF-8 bytes.
    Utf8,
    /// u8 record count, then that many records of fixed-width fields.
    List(Vec<FieldKind>),
    /// Remainder of the frame. Only valid as the last field.
    Bytes,
}

impl FieldKind {
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldKind::U8 => Some(1),
            FieldKind::U16 | FieldKind::I16 => Some(2),
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => Some(4),
            FieldKind::F64 => Some(8),
            FieldKind::Utf16 | FieldKind::Utf8 | FieldKind::List(_) | FieldKind::Bytes => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::U8 => "uint8",
            FieldKind::U16 => "uint16",
            FieldKind::I16 => "int16",
            FieldKind::U32 => "uint32",
            FieldKind::I32 => "int32",
            FieldKind::F32 => "float",
            FieldKind::F64 => "double",
            FieldKind::Utf16 => "string",
            FieldKind::Utf8 => "utf8",
            FieldKind::List(_) => "list",
            FieldKind::Bytes => "bytes",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::List(record) => {
                write!(f, "list[")?;
                for (i, kind) in record.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{kind}")?;
                }
                write!(f, "]")
            }
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for FieldKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "uint8" => Ok(FieldKind::U8),
            "uint16" => Ok(FieldKind::U16),
            "int16" => Ok(FieldKind::I16),
            "uint32" => Ok(FieldKind::U32),
            "int32" => Ok(FieldKind::I32),
            "float" => Ok(FieldKind::F32),
            "double" => Ok(FieldKind::F64),
            "string" => Ok(FieldKind::Utf16),
            "utf8" => Ok(FieldKind::Utf8),
            "bytes" => Ok(FieldKind::Bytes),
            other => Err(ProtocolError::InvalidLayout(format!(
                "unsupported field type '{other}'"
            ))),
        }
    }
}

/// A decoded (or to-be-encoded) field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
    Text(String),
    List(Vec<Vec<FieldValue>>),
    Bytes(Bytes),
}

impl FieldValue {
    pub fn matches(&self, kind: &FieldKind) -> bool {
        match (self, kind) {
            (FieldValue::U8(_), FieldKind::U8)
            | (FieldValue::U16(_), FieldKind::U16)
            | (FieldValue::I16(_), FieldKind::I16)
            | (FieldValue::U32(_), FieldKind::U32)
            | (FieldValue::I32(_), FieldKind::I32)
            | (FieldValue::F32(_), FieldKind::F32)
            | (FieldValue::F64(_), FieldKind::F64)
            | (FieldValue::Text(_), FieldKind::Utf16)
            | (FieldValue::Text(_), FieldKind::Utf8)
            | (FieldValue::Bytes(_), FieldKind::Bytes) => true,
            (FieldValue::List(records), FieldKind::List(layout)) => records.iter().all(|record| {
                record.len() == layout.len()
                    && record.iter().zip(layout).all(|(value, kind)| value.matches(kind))
            }),
            _ => false,
        }
    }
}
