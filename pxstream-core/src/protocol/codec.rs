//! Frame codec. A frame is one type-id byte followed by the fields of the
//! registered layout; every number is little-endian.

use crate::protocol::{FieldKind, FieldValue, MessageSpec, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Split a raw frame into its type id and body.
pub fn split_frame(frame: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    match frame.split_first() {
        Some((id, body)) => Ok((*id, body)),
        None => Err(ProtocolError::EmptyFrame),
    }
}

/// Encode a full frame (type id + fields) for `spec`.
pub fn encode_frame(spec: &MessageSpec, values: &[FieldValue]) -> Result<Bytes, ProtocolError> {
    let mut out = BytesMut::with_capacity(1 + values.len() * 4);
    out.put_u8(spec.id);
    encode_fields(&spec.layout, values, &mut out).map_err(|e| match e {
        ProtocolError::LayoutMismatch(detail) => {
            ProtocolError::LayoutMismatch(format!("{}: {detail}", spec.name))
        }
        other => other,
    })?;
    Ok(out.freeze())
}

pub fn encode_fields(
    layout: &[FieldKind],
    values: &[FieldValue],
    out: &mut BytesMut,
) -> Result<(), ProtocolError> {
    if layout.len() != values.len() {
        return Err(ProtocolError::LayoutMismatch(format!(
            "expected {} fields, got {}",
            layout.len(),
            values.len()
        )));
    }
    for (kind, value) in layout.iter().zip(values) {
        encode_value(kind, value, out)?;
    }
    Ok(())
}

fn encode_value(kind: &FieldKind, value: &FieldValue, out: &mut BytesMut) -> Result<(), ProtocolError> {
    match (kind, value) {
        (FieldKind::U8, FieldValue::U8(v)) => out.put_u8(*v),
        (FieldKind::U16, FieldValue::U16(v)) => out.put_u16_le(*v),
        (FieldKind::I16, FieldValue::I16(v)) => out.put_i16_le(*v),
        (FieldKind::U32, FieldValue::U32(v)) => out.put_u32_le(*v),
        (FieldKind::I32, FieldValue::I32(v)) => out.put_i32_le(*v),
        (FieldKind::F32, FieldValue::F32(v)) => out.put_f32_le(*v),
        (FieldKind::F64, FieldValue::F64(v)) => out.put_f64_le(*v),
        (FieldKind::Utf16, FieldValue::Text(text)) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            out.put_u16_le(length_prefix(units.len(), "string")?);
            for unit in units {
                out.put_u16_le(unit);
            }
        }
        (FieldKind::Utf8, FieldValue::Text(text)) => {
            out.put_u16_le(length_prefix(text.len(), "utf8 string")?);
            out.put_slice(text.as_bytes());
        }
        (FieldKind::List(record_layout), FieldValue::List(records)) => {
            let count = u8::try_from(records.len()).map_err(|_| {
                ProtocolError::LayoutMismatch(format!("list of {} records exceeds 255", records.len()))
            })?;
            out.put_u8(count);
            for record in records {
                encode_fields(record_layout, record, out)?;
            }
        }
        (FieldKind::Bytes, FieldValue::Bytes(data)) => out.put_slice(data),
        (kind, value) => {
            return Err(ProtocolError::LayoutMismatch(format!(
                "{value:?} does not fit a {kind} field"
            )));
        }
    }
    Ok(())
}

fn length_prefix(len: usize, what: &str) -> Result<u16, ProtocolError> {
    u16::try_from(len)
        .map_err(|_| ProtocolError::LayoutMismatch(format!("{what} of length {len} exceeds u16")))
}

/// Decode `body` (the frame without its type id) against `layout`.
pub fn decode_fields(layout: &[FieldKind], body: &[u8]) -> Result<Vec<FieldValue>, ProtocolError> {
    let mut cursor = body;
    let values = decode_record(layout, &mut cursor)?;
    if !cursor.is_empty() {
        return Err(ProtocolError::Malformed(format!(
            "{} trailing bytes after layout",
            cursor.len()
        )));
    }
    Ok(values)
}

fn decode_record(layout: &[FieldKind], cursor: &mut &[u8]) -> Result<Vec<FieldValue>, ProtocolError> {
    layout.iter().map(|kind| decode_value(kind, cursor)).collect()
}

fn ensure(cursor: &&[u8], needed: usize) -> Result<(), ProtocolError> {
    if cursor.remaining() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            remaining: cursor.remaining(),
        });
    }
    Ok(())
}

fn decode_value(kind: &FieldKind, cursor: &mut &[u8]) -> Result<FieldValue, ProtocolError> {
    if let Some(size) = kind.fixed_size() {
        ensure(cursor, size)?;
    }
    let value = match kind {
        FieldKind::U8 => FieldValue::U8(cursor.get_u8()),
        FieldKind::U16 => FieldValue::U16(cursor.get_u16_le()),
        FieldKind::I16 => FieldValue::I16(cursor.get_i16_le()),
        FieldKind::U32 => FieldValue::U32(cursor.get_u32_le()),
        FieldKind::I32 => FieldValue::I32(cursor.get_i32_le()),
        FieldKind::F32 => FieldValue::F32(cursor.get_f32_le()),
        FieldKind::F64 => FieldValue::F64(cursor.get_f64_le()),
        FieldKind::Utf16 => {
            ensure(cursor, 2)?;
            let units = cursor.get_u16_le() as usize;
            ensure(cursor, units * 2)?;
            let code_units: Vec<u16> = (0..units).map(|_| cursor.get_u16_le()).collect();
            let text = String::from_utf16(&code_units)
                .map_err(|e| ProtocolError::Malformed(format!("invalid UTF-16: {e}")))?;
            FieldValue::Text(text)
        }
        FieldKind::Utf8 => {
            ensure(cursor, 2)?;
            let len = cursor.get_u16_le() as usize;
            ensure(cursor, len)?;
            let text = std::str::from_utf8(&cursor[..len])
                .map_err(|e| ProtocolError::Malformed(format!("invalid UTF-8: {e}")))?
                .to_owned();
            cursor.advance(len);
            FieldValue::Text(text)
        }
        FieldKind::List(record_layout) => {
            ensure(cursor, 1)?;
            let count = cursor.get_u8() as usize;
            let record_size: usize = record_layout.iter().filter_map(FieldKind::fixed_size).sum();
            ensure(cursor, count * record_size)?;
            let records = (0..count)
                .map(|_| decode_record(record_layout, cursor))
                .collect::<Result<Vec<_>, _>>()?;
            FieldValue::List(records)
        }
        FieldKind::Bytes => {
            let data = Bytes::copy_from_slice(cursor);
            cursor.advance(cursor.len());
            FieldValue::Bytes(data)
        }
    };
    Ok(value)
}
