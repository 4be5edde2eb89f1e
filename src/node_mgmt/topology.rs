//! Device topology: Channel -> Device -> TagGroup -> Tag.
//!
//! The graph is built once from the gateway document and never mutated; a
//! configuration reload replaces it wholesale.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::helpers::millis;
use crate::readers::codec;

pub type TagId = u32;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bit,
    Byte,
    Word,
    DWord,
    Int16,
    Int32,
    Float32,
    Float64,
    /// Fixed-capacity single-byte string with a 2-byte header.
    String,
    /// Fixed-capacity UTF-16 string with a 4-byte header.
    WString,
}

impl DataType {
    pub fn is_string(self) -> bool {
        matches!(self, DataType::String | DataType::WString)
    }
}

/// Behavior of a tag in the polling pipeline.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    #[default]
    Normal,
    Heartbeat,
    Trigger,
    Notice,
    Switch,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    #[default]
    OnlyOnChange,
    EveryScan,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Driver-specific address string.
    pub address: String,
    /// Element count for arrays, capacity for strings, 0 for scalars.
    #[serde(default)]
    pub length: u32,
    pub data_type: DataType,
    #[serde(default)]
    pub flag: Flag,
    /// Poll period in milliseconds; the engine default applies when unset.
    #[serde(default)]
    pub scan_rate: Option<u64>,
    #[serde(default)]
    pub publish_mode: PublishMode,
    /// Companion tags read together with this one when it fires.
    #[serde(default)]
    pub normal_tags: Vec<Tag>,
    /// Trigger: name of the tag receiving the status code instead of the
    /// trigger itself.
    #[serde(default)]
    pub ack_tag: Option<String>,
    /// Heartbeat: write the complement back as soon as a change is seen.
    #[serde(default)]
    pub auto_ack: bool,
    /// Heartbeat: only track the signal, never notify connectivity.
    #[serde(default)]
    pub signal_only: bool,
    /// Switch: sampling period of the companion tags while enabled.
    #[serde(default)]
    pub sample_rate: Option<u64>,
}

impl Tag {
    pub fn wire_length(&self) -> usize {
        codec::wire_length(self.data_type, self.length)
    }

    pub fn scan_interval(&self, default: Duration) -> Duration {
        self.scan_rate.map(millis).unwrap_or(default)
    }

    pub fn sample_interval(&self, default: Duration) -> Duration {
        self.sample_rate.map(millis).unwrap_or(default)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TagGroup {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Tags written from the callback items of a request forwarder reply.
    #[serde(default)]
    pub callback_tags: Vec<Tag>,
}

impl TagGroup {
    pub fn find(&self, name: &str) -> Option<&Tag> {
        self.callback_tags
            .iter()
            .chain(self.tags.iter())
            .find(|t| t.name == name)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Device {
    pub id: u32,
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub max_pdu_size: Option<usize>,
    #[serde(default)]
    pub pool_size: Option<usize>,
    #[serde(default)]
    pub trigger_armed_value: Option<i64>,
    #[serde(default)]
    pub tag_groups: Vec<TagGroup>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Device {
    /// Every tag with a behavior other than `Normal`, with its owning group.
    pub fn flagged_tags(&self) -> impl Iterator<Item = (Option<&TagGroup>, &Tag)> {
        let top = self.tags.iter().map(|t| (None, t));
        let grouped = self
            .tag_groups
            .iter()
            .flat_map(|g| g.tags.iter().map(move |t| (Some(g), t)));
        top.chain(grouped).filter(|(_, t)| t.flag != Flag::Normal)
    }

    /// Resolve a write-back tag by name: the group's callback tags, then the
    /// group's tags, then the device's top-level tags.
    pub fn resolve_tag<'a>(&'a self, group: Option<&'a TagGroup>, name: &str) -> Option<&'a Tag> {
        group
            .and_then(|g| g.find(name))
            .or_else(|| self.tags.iter().find(|t| t.name == name))
    }

    /// Every tag reachable from the device, companions included.
    pub fn all_tags(&self) -> Vec<&Tag> {
        fn walk<'a>(tags: &'a [Tag], out: &mut Vec<&'a Tag>) {
            for tag in tags {
                out.push(tag);
                walk(&tag.normal_tags, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.tags, &mut out);
        for group in &self.tag_groups {
            walk(&group.tags, &mut out);
            walk(&group.callback_tags, &mut out);
        }
        out
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Channel {
    pub id: u32,
    pub name: String,
    /// Driver kind, looked up in the driver registry at startup.
    pub driver: String,
    #[serde(default)]
    pub devices: Vec<Device>,
}
