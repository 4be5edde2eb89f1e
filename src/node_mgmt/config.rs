use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::settings::EngineSettings;
use super::topology::{Channel, Device, Flag, Tag, TagGroup, TagId};
use crate::readers::codec;

/// The gateway document: engine settings plus the device topology.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn from_str(config_raw: &str) -> Result<Config, ConfigError> {
    let config = serde_json::from_str::<Config>(config_raw)?;
    validate(&config)?;
    Ok(config)
}

pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    log::info!("Loading gateway config from {}", path.display());
    from_str(&std::fs::read_to_string(path)?)
}

fn invalid<T>(msg: String) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(msg))
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.settings.mailbox_capacity == 0 {
        return invalid("mailbox_capacity must be at least 1".into());
    }
    if config.settings.pool_max_size == 0 {
        return invalid("pool_max_size must be at least 1".into());
    }

    let mut channel_ids = HashSet::new();
    let mut device_ids = HashSet::new();
    let mut tags_by_id: HashMap<TagId, &Tag> = HashMap::new();

    for channel in &config.channels {
        if !channel_ids.insert(channel.id) {
            return invalid(format!("duplicate channel id {}", channel.id));
        }
        for device in &channel.devices {
            if !device_ids.insert(device.id) {
                return invalid(format!("duplicate device id {}", device.id));
            }
            if device.pool_size == Some(0) {
                return invalid(format!("device '{}' has pool_size 0", device.name));
            }
            for tag in device.all_tags() {
                check_tag_identity(&mut tags_by_id, tag)?;
            }
            for (group, tag) in device.flagged_tags() {
                check_flagged_tag(device, group, tag)?;
            }
        }
    }
    Ok(())
}

/// The same id may appear more than once (e.g. a tag that is also a
/// companion), but it must always describe the same data point.
fn check_tag_identity<'a>(
    tags_by_id: &mut HashMap<TagId, &'a Tag>,
    tag: &'a Tag,
) -> Result<(), ConfigError> {
    if tag.scan_rate == Some(0) || tag.sample_rate == Some(0) {
        return invalid(format!("tag '{}' has a zero scan/sample rate", tag.name));
    }
    if let Err(e) = codec::check_length(tag.data_type, tag.length) {
        return invalid(format!("tag '{}': {}", tag.name, e));
    }
    match tags_by_id.entry(tag.id) {
        Entry::Occupied(seen) => {
            let seen = *seen.get();
            if seen.address != tag.address
                || seen.data_type != tag.data_type
                || seen.length != tag.length
            {
                return invalid(format!(
                    "tag id {} is used for both '{}' and '{}'",
                    tag.id, seen.name, tag.name
                ));
            }
            Ok(())
        }
        Entry::Vacant(slot) => {
            slot.insert(tag);
            Ok(())
        }
    }
}

fn check_flagged_tag(
    device: &Device,
    group: Option<&TagGroup>,
    tag: &Tag,
) -> Result<(), ConfigError> {
    match tag.flag {
        Flag::Trigger => {
            if let Some(ack) = &tag.ack_tag {
                if device.resolve_tag(group, ack).is_none() {
                    return invalid(format!(
                        "trigger '{}' on device '{}' names unknown ack tag '{}'",
                        tag.name, device.name, ack
                    ));
                }
            }
        }
        Flag::Switch if tag.normal_tags.is_empty() => {
            return invalid(format!(
                "switch '{}' on device '{}' has no companion tags to sample",
                tag.name, device.name
            ));
        }
        _ => {}
    }
    Ok(())
}
