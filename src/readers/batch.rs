//! Batched multi-tag reads under a request size ceiling.
//!
//! Tags are packed greedily in caller order; a tag never straddles two
//! batches. Batches are issued one after another and their decoded values
//! concatenated in input order. Any failing batch fails the whole read.

use std::ops::Range;

use itertools::Itertools;

use super::codec;
use super::Driver;
use crate::data_mgmt::models::{PayloadData, TagValue};
use crate::errors::TagError;
use crate::node_mgmt::topology::Tag;

/// A contiguous run of the input tags sent as one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub range: Range<usize>,
    pub byte_len: usize,
}

/// The smaller of a configured override and what the connection advertises.
pub fn effective_ceiling(max_override: Option<usize>, advertised: usize) -> usize {
    max_override
        .map_or(advertised, |o| o.min(advertised))
        .max(1)
}

pub fn plan_batches(tags: &[Tag], ceiling: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut sum = 0;

    for (i, tag) in tags.iter().enumerate() {
        let len = tag.wire_length();
        if i > start && sum + len > ceiling {
            batches.push(Batch {
                range: start..i,
                byte_len: sum,
            });
            start = i;
            sum = 0;
        }
        if len > ceiling {
            log::warn!(
                "Tag '{}' needs {} bytes, more than the {} byte ceiling; sending it alone",
                tag.name,
                len,
                ceiling
            );
        }
        sum += len;
    }
    if start < tags.len() {
        batches.push(Batch {
            range: start..tags.len(),
            byte_len: sum,
        });
    }
    batches
}

/// Slice one batch reply into typed values. Offsets advance by the same
/// [`codec::wire_length`] the planner used.
pub fn decode_batch(tags: &[Tag], reply: &[u8]) -> Result<Vec<PayloadData>, TagError> {
    let mut offset = 0;
    let mut values = Vec::with_capacity(tags.len());

    for tag in tags {
        let len = tag.wire_length();
        let Some(slice) = reply.get(offset..offset + len) else {
            log::trace!("Short batch reply: {}", hex::encode(reply));
            return Err(TagError::BatchDecode(format!(
                "reply of {} bytes ends before tag '{}' at offset {} (+{})",
                reply.len(),
                tag.name,
                offset,
                len
            )));
        };
        let value = codec::decode(tag.data_type, tag.length, slice)?;
        values.push(PayloadData::new(tag, value));
        offset += len;
    }

    if offset < reply.len() {
        log::debug!(
            "Ignoring {} trailing reply bytes after {} tags",
            reply.len() - offset,
            tags.len()
        );
    }
    Ok(values)
}

pub async fn read_tags<D>(
    driver: &mut D,
    tags: &[Tag],
    max_override: Option<usize>,
) -> Result<Vec<PayloadData>, TagError>
where
    D: Driver + ?Sized,
{
    let ceiling = effective_ceiling(max_override, driver.max_pdu_size());
    let batches = plan_batches(tags, ceiling);
    log::trace!(
        "Reading {} tags in {} batch(es), ceiling {} bytes",
        tags.len(),
        batches.len(),
        ceiling
    );

    let mut values = Vec::with_capacity(tags.len());
    for batch in batches {
        let batch_tags = &tags[batch.range.clone()];
        let addresses = batch_tags.iter().map(|t| t.address.as_str()).collect_vec();
        let lengths = batch_tags.iter().map(Tag::wire_length).collect_vec();

        let reply = driver.read_batch(&addresses, &lengths).await?;
        values.extend(decode_batch(batch_tags, &reply)?);
    }
    Ok(values)
}

/// Write a single tag. The returned payload carries the normalised value
/// the driver sent, ready for the snapshot store.
pub async fn write_tag<D>(
    driver: &mut D,
    tag: &Tag,
    value: &TagValue,
) -> Result<PayloadData, TagError>
where
    D: Driver + ?Sized,
{
    let coerced = value.coerce(tag.data_type, tag.length)?;
    let sent = driver.write(tag, &coerced).await?;
    log::debug!("Wrote {} to '{}' ({})", sent, tag.name, tag.address);
    Ok(PayloadData::new(tag, sent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_mgmt::topology::DataType;
    use serde_json::json;

    fn tag(id: u32, data_type: &str, length: u32) -> Tag {
        serde_json::from_value(json!({
            "id": id, "name": format!("t{id}"), "address": format!("DB1.{id}"),
            "data_type": data_type, "length": length
        }))
        .unwrap()
    }

    #[test]
    fn ceiling_takes_the_smaller_limit() {
        assert_eq!(effective_ceiling(None, 240), 240);
        assert_eq!(effective_ceiling(Some(100), 240), 100);
        assert_eq!(effective_ceiling(Some(960), 240), 240);
    }

    #[test]
    fn closes_batch_before_overflow() {
        // 4 + 4 + 8 + 2 bytes against a ceiling of 10
        let tags = vec![
            tag(1, "int32", 0),
            tag(2, "float32", 0),
            tag(3, "float64", 0),
            tag(4, "int16", 0),
        ];
        let batches = plan_batches(&tags, 10);
        assert_eq!(
            batches,
            vec![
                Batch { range: 0..2, byte_len: 8 },
                Batch { range: 2..4, byte_len: 10 },
            ]
        );
    }

    #[test]
    fn oversized_tag_gets_its_own_batch() {
        let tags = vec![tag(1, "int16", 0), tag(2, "string", 40), tag(3, "int16", 0)];
        let batches = plan_batches(&tags, 16);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1], Batch { range: 1..2, byte_len: 42 });
    }

    #[test]
    fn empty_input_plans_nothing() {
        assert!(plan_batches(&[], 10).is_empty());
    }

    #[test]
    fn decode_walks_offsets() {
        let tags = vec![tag(1, "int16", 0), tag(2, "string", 3), tag(3, "byte", 2)];
        let reply = [0xFF, 0xFE, 3, 2, b'o', b'k', 0, 7, 9];
        let values = decode_batch(&tags, &reply).unwrap();
        assert_eq!(values[0].value, TagValue::Int16(-2));
        assert_eq!(values[1].value, TagValue::String("ok".into()));
        assert_eq!(
            values[2].value,
            TagValue::Array(vec![TagValue::Byte(7), TagValue::Byte(9)])
        );
        assert_eq!(values[2].data_type, DataType::Byte);
    }

    #[test]
    fn decode_rejects_short_reply() {
        let tags = vec![tag(1, "int16", 0), tag(2, "int32", 0)];
        assert!(matches!(
            decode_batch(&tags, &[0, 1, 0, 0]),
            Err(TagError::BatchDecode(_))
        ));
    }
}
