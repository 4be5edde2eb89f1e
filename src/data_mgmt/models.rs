use std::fmt;

use serde::Serialize;

use crate::errors::TagError;
use crate::node_mgmt::topology::{DataType, Tag, TagId};
use crate::readers::codec;

/// Dynamically typed value of a tag.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Byte(u8),
    Word(u16),
    DWord(u32),
    Int16(i16),
    Int32(i32),
    Float32(f32),
    Float64(f64),
    String(String),
    Array(Vec<TagValue>),
}

impl TagValue {
    /// Truthiness used for heartbeat and switch tags: non-zero numbers are on.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(b) => Some(*b),
            TagValue::String(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" | "" => Some(false),
                _ => None,
            },
            TagValue::Array(_) => None,
            other => other.as_f64().map(|v| v != 0.0),
        }
    }

    /// Integer view; floats only convert when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Bool(b) => Some(*b as i64),
            TagValue::Byte(v) => Some(*v as i64),
            TagValue::Word(v) => Some(*v as i64),
            TagValue::DWord(v) => Some(*v as i64),
            TagValue::Int16(v) => Some(*v as i64),
            TagValue::Int32(v) => Some(*v as i64),
            TagValue::Float32(v) => integral(*v as f64),
            TagValue::Float64(v) => integral(*v),
            TagValue::String(s) => s.trim().parse().ok(),
            TagValue::Array(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Float32(v) => Some(*v as f64),
            TagValue::Float64(v) => Some(*v),
            TagValue::String(s) => s.trim().parse().ok(),
            TagValue::Array(_) => None,
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Loose conversion of a JSON value (e.g. a forwarder callback item).
    /// The result still has to be [`coerce`](Self::coerce)d to a tag type.
    pub fn from_json(value: &serde_json::Value) -> Result<TagValue, TagError> {
        use serde_json::Value;
        match value {
            Value::Bool(b) => Ok(TagValue::Bool(*b)),
            Value::Number(n) => match n.as_i64().and_then(|v| i32::try_from(v).ok()) {
                Some(v) => Ok(TagValue::Int32(v)),
                None => n
                    .as_f64()
                    .map(TagValue::Float64)
                    .ok_or_else(|| TagError::InvalidValue(format!("unrepresentable number {n}"))),
            },
            Value::String(s) => Ok(TagValue::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(TagValue::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(TagValue::Array),
            other => Err(TagError::InvalidValue(format!(
                "cannot write {other} to a tag"
            ))),
        }
    }

    /// Normalise to the canonical representation of `data_type`/`length`,
    /// the same shape a read of that tag would produce.
    pub fn coerce(&self, data_type: DataType, length: u32) -> Result<TagValue, TagError> {
        if !data_type.is_string() && length > 0 {
            let TagValue::Array(items) = self else {
                return Err(TagError::InvalidValue(format!(
                    "expected an array of {length} x {data_type:?}, got {self}"
                )));
            };
            if items.len() != length as usize {
                return Err(TagError::InvalidValue(format!(
                    "expected {length} elements, got {}",
                    items.len()
                )));
            }
            return items
                .iter()
                .map(|v| v.coerce_scalar(data_type, 0))
                .collect::<Result<Vec<_>, _>>()
                .map(TagValue::Array);
        }
        self.coerce_scalar(data_type, length)
    }

    fn coerce_scalar(&self, data_type: DataType, length: u32) -> Result<TagValue, TagError> {
        let mismatch = || TagError::InvalidValue(format!("{self} does not fit {data_type:?}"));
        let int = || self.as_i64().ok_or_else(mismatch);
        let value = match data_type {
            DataType::Bit => TagValue::Bool(self.as_bool().ok_or_else(mismatch)?),
            DataType::Byte => TagValue::Byte(u8::try_from(int()?).map_err(|_| mismatch())?),
            DataType::Word => TagValue::Word(u16::try_from(int()?).map_err(|_| mismatch())?),
            DataType::DWord => TagValue::DWord(u32::try_from(int()?).map_err(|_| mismatch())?),
            DataType::Int16 => TagValue::Int16(i16::try_from(int()?).map_err(|_| mismatch())?),
            DataType::Int32 => TagValue::Int32(i32::try_from(int()?).map_err(|_| mismatch())?),
            DataType::Float32 => TagValue::Float32(self.as_f64().ok_or_else(mismatch)? as f32),
            DataType::Float64 => TagValue::Float64(self.as_f64().ok_or_else(mismatch)?),
            DataType::String | DataType::WString => {
                if matches!(self, TagValue::Array(_)) {
                    return Err(mismatch());
                }
                let text = match self {
                    TagValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                TagValue::String(codec::truncate_to_capacity(data_type, length, text))
            }
        };
        Ok(value)
    }
}

fn integral(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Byte(v) => write!(f, "{v}"),
            TagValue::Word(v) => write!(f, "{v}"),
            TagValue::DWord(v) => write!(f, "{v}"),
            TagValue::Int16(v) => write!(f, "{v}"),
            TagValue::Int32(v) => write!(f, "{v}"),
            TagValue::Float32(v) => write!(f, "{v}"),
            TagValue::Float64(v) => write!(f, "{v}"),
            TagValue::String(v) => write!(f, "{v}"),
            TagValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A value read from (or written to) a tag, with the tag's metadata.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PayloadData {
    pub tag_id: TagId,
    pub name: String,
    pub address: String,
    pub data_type: DataType,
    pub length: u32,
    pub value: TagValue,
}

impl PayloadData {
    pub fn new(tag: &Tag, value: TagValue) -> Self {
        Self {
            tag_id: tag.id,
            name: tag.name.clone(),
            address: tag.address.clone(),
            data_type: tag.data_type,
            length: tag.length,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert_eq!(TagValue::Int16(0).as_bool(), Some(false));
        assert_eq!(TagValue::Word(3).as_bool(), Some(true));
        assert_eq!(TagValue::Float32(0.5).as_bool(), Some(true));
        assert_eq!(TagValue::Array(vec![]).as_bool(), None);
    }

    #[test]
    fn integer_view_rejects_fractions() {
        assert_eq!(TagValue::Float64(2.0).as_i64(), Some(2));
        assert_eq!(TagValue::Float64(2.5).as_i64(), None);
    }

    #[test]
    fn coerce_checks_range() {
        assert_eq!(
            TagValue::Int32(300).coerce(DataType::Int16, 0),
            Ok(TagValue::Int16(300))
        );
        assert!(TagValue::Int32(70_000).coerce(DataType::Int16, 0).is_err());
        assert!(TagValue::Int32(-1).coerce(DataType::Word, 0).is_err());
        assert_eq!(
            TagValue::Int32(1).coerce(DataType::Float32, 0),
            Ok(TagValue::Float32(1.0))
        );
    }

    #[test]
    fn coerce_arrays_by_length() {
        let v = TagValue::from_json(&json!([1, 0, 1])).unwrap();
        assert_eq!(
            v.coerce(DataType::Bit, 3),
            Ok(TagValue::Array(vec![
                TagValue::Bool(true),
                TagValue::Bool(false),
                TagValue::Bool(true)
            ]))
        );
        assert!(v.coerce(DataType::Bit, 4).is_err());
        assert!(TagValue::Int32(1).coerce(DataType::Int16, 2).is_err());
    }

    #[test]
    fn strings_are_truncated_to_capacity() {
        let v = TagValue::from_json(&json!("ABCDEFGH")).unwrap();
        assert_eq!(
            v.coerce(DataType::String, 4),
            Ok(TagValue::String("ABCD".to_string()))
        );
        assert_eq!(
            TagValue::Int32(42).coerce(DataType::String, 10),
            Ok(TagValue::String("42".to_string()))
        );
    }

    #[test]
    fn json_objects_are_rejected() {
        assert!(TagValue::from_json(&json!({"a": 1})).is_err());
        assert!(TagValue::from_json(&json!(null)).is_err());
    }
}
