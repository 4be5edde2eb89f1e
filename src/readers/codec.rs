//! On-wire layout of tag values.
//!
//! All numerics are big-endian. Bit arrays are packed LSB-first within each
//! byte. `String` carries a 2-byte header (capacity, actual length) followed
//! by `capacity` bytes; `WString` a 4-byte header (u16 capacity, u16 actual
//! length) followed by `capacity` UTF-16 units. Capacity is `max(length, 1)`.
//!
//! [`wire_length`] is the single source of truth for how many bytes a tag
//! occupies: batch planning and reply decoding both go through it.

use crate::data_mgmt::models::TagValue;
use crate::errors::TagError;
use crate::node_mgmt::topology::DataType;

pub const STRING_HEADER: usize = 2;
pub const WSTRING_HEADER: usize = 4;
/// Capacity and actual length share one header byte.
pub const STRING_MAX_LEN: u32 = 254;
pub const WSTRING_MAX_LEN: u32 = 16382;

fn element_size(data_type: DataType) -> usize {
    match data_type {
        DataType::Bit | DataType::Byte => 1,
        DataType::Word | DataType::Int16 => 2,
        DataType::DWord | DataType::Int32 | DataType::Float32 => 4,
        DataType::Float64 => 8,
        DataType::String => 1,
        DataType::WString => 2,
    }
}

/// Number of bytes a tag of this type and length occupies in a reply.
/// Zero-length tags count as one element.
pub fn wire_length(data_type: DataType, length: u32) -> usize {
    let count = length.max(1) as usize;
    match data_type {
        DataType::Bit => count.div_ceil(8),
        DataType::String => STRING_HEADER + count,
        DataType::WString => WSTRING_HEADER + 2 * count,
        other => element_size(other) * count,
    }
}

/// Reject string capacities the header cannot describe.
pub fn check_length(data_type: DataType, length: u32) -> Result<(), TagError> {
    let max = match data_type {
        DataType::String => STRING_MAX_LEN,
        DataType::WString => WSTRING_MAX_LEN,
        _ => return Ok(()),
    };
    if length > max {
        return Err(TagError::InvalidValue(format!(
            "{data_type:?} capacity {length} exceeds {max}"
        )));
    }
    Ok(())
}

/// Cut `text` so it fits the string capacity of a tag.
pub fn truncate_to_capacity(data_type: DataType, length: u32, text: String) -> String {
    let capacity = length.max(1) as usize;
    match data_type {
        DataType::WString => {
            let mut units = 0;
            text.chars()
                .take_while(|c| {
                    units += c.len_utf16();
                    units <= capacity
                })
                .collect()
        }
        _ => {
            let mut bytes = 0;
            text.chars()
                .take_while(|c| {
                    bytes += c.len_utf8();
                    bytes <= capacity
                })
                .collect()
        }
    }
}

fn short(data_type: DataType, need: usize, got: usize) -> TagError {
    TagError::BatchDecode(format!(
        "{data_type:?} needs {need} bytes, reply has {got}"
    ))
}

/// Decode one tag value from the start of `bytes`.
pub fn decode(data_type: DataType, length: u32, bytes: &[u8]) -> Result<TagValue, TagError> {
    let need = wire_length(data_type, length);
    if bytes.len() < need {
        return Err(short(data_type, need, bytes.len()));
    }
    let bytes = &bytes[..need];

    match data_type {
        DataType::String => {
            let capacity = length.max(1) as usize;
            let actual = (bytes[1] as usize).min(capacity);
            let body = &bytes[STRING_HEADER..STRING_HEADER + actual];
            Ok(TagValue::String(String::from_utf8_lossy(body).into_owned()))
        }
        DataType::WString => {
            let capacity = length.max(1) as usize;
            let actual = (u16::from_be_bytes([bytes[2], bytes[3]]) as usize).min(capacity);
            let units: Vec<u16> = bytes[WSTRING_HEADER..WSTRING_HEADER + 2 * actual]
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Ok(TagValue::String(String::from_utf16_lossy(&units)))
        }
        DataType::Bit if length > 0 => Ok(TagValue::Array(
            (0..length as usize)
                .map(|i| TagValue::Bool(bytes[i / 8] >> (i % 8) & 1 == 1))
                .collect(),
        )),
        _ if length > 0 => Ok(TagValue::Array(
            bytes
                .chunks_exact(element_size(data_type))
                .map(|c| decode_scalar(data_type, c))
                .collect(),
        )),
        _ => Ok(decode_scalar(data_type, bytes)),
    }
}

/// `bytes` holds exactly one element of a fixed-width type.
fn decode_scalar(data_type: DataType, b: &[u8]) -> TagValue {
    match data_type {
        DataType::Bit => TagValue::Bool(b[0] & 1 == 1),
        DataType::Byte => TagValue::Byte(b[0]),
        DataType::Word => TagValue::Word(u16::from_be_bytes([b[0], b[1]])),
        DataType::Int16 => TagValue::Int16(i16::from_be_bytes([b[0], b[1]])),
        DataType::DWord => TagValue::DWord(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        DataType::Int32 => TagValue::Int32(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        DataType::Float32 => TagValue::Float32(f32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        DataType::Float64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[..8]);
            TagValue::Float64(f64::from_be_bytes(raw))
        }
        // string types never reach the fixed-width path
        DataType::String | DataType::WString => TagValue::String(String::new()),
    }
}

/// Encode a value into exactly [`wire_length`] bytes. The value is coerced
/// to the tag type first.
pub fn encode(data_type: DataType, length: u32, value: &TagValue) -> Result<Vec<u8>, TagError> {
    check_length(data_type, length)?;
    let value = value.coerce(data_type, length)?;
    let mut out = Vec::with_capacity(wire_length(data_type, length));

    match (&value, data_type) {
        (TagValue::String(s), DataType::String) => {
            let capacity = length.max(1) as usize;
            out.push(capacity as u8);
            out.push(s.len() as u8);
            out.extend_from_slice(s.as_bytes());
            out.resize(STRING_HEADER + capacity, 0);
        }
        (TagValue::String(s), DataType::WString) => {
            let capacity = length.max(1) as usize;
            let units: Vec<u16> = s.encode_utf16().collect();
            out.extend_from_slice(&(capacity as u16).to_be_bytes());
            out.extend_from_slice(&(units.len() as u16).to_be_bytes());
            for unit in units {
                out.extend_from_slice(&unit.to_be_bytes());
            }
            out.resize(WSTRING_HEADER + 2 * capacity, 0);
        }
        (TagValue::Array(items), DataType::Bit) => {
            out.resize(wire_length(data_type, length), 0);
            for (i, item) in items.iter().enumerate() {
                if item.as_bool() == Some(true) {
                    out[i / 8] |= 1 << (i % 8);
                }
            }
        }
        (TagValue::Array(items), _) => {
            for item in items {
                encode_scalar(item, &mut out);
            }
        }
        (scalar, _) => encode_scalar(scalar, &mut out),
    }
    Ok(out)
}

fn encode_scalar(value: &TagValue, out: &mut Vec<u8>) {
    match value {
        TagValue::Bool(b) => out.push(*b as u8),
        TagValue::Byte(v) => out.push(*v),
        TagValue::Word(v) => out.extend_from_slice(&v.to_be_bytes()),
        TagValue::DWord(v) => out.extend_from_slice(&v.to_be_bytes()),
        TagValue::Int16(v) => out.extend_from_slice(&v.to_be_bytes()),
        TagValue::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
        TagValue::Float32(v) => out.extend_from_slice(&v.to_be_bytes()),
        TagValue::Float64(v) => out.extend_from_slice(&v.to_be_bytes()),
        TagValue::String(_) | TagValue::Array(_) => {}
    }
}
