use std::sync::Arc;

use super::device::DeviceRuntime;
use crate::data_mgmt::models::{PayloadData, TagValue};
use crate::node_mgmt::topology::{Device, TagGroup, Tag};

/// A flagged tag together with the device it lives on. Shared by the tag's
/// poller and every event it emits.
pub struct TagContext {
    pub runtime: Arc<DeviceRuntime>,
    group: Option<usize>,
    pub tag: Tag,
}

impl TagContext {
    pub fn new(runtime: Arc<DeviceRuntime>, group: Option<usize>, tag: Tag) -> Self {
        Self {
            runtime,
            group,
            tag,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.runtime.channel.name
    }

    pub fn device(&self) -> &Device {
        &self.runtime.device
    }

    pub fn group(&self) -> Option<&TagGroup> {
        self.group.and_then(|i| self.runtime.device.tag_groups.get(i))
    }

    pub fn group_name(&self) -> Option<&str> {
        self.group().map(|g| g.name.as_str())
    }

    /// `channel/device/tag`, for log lines.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}",
            self.channel_name(),
            self.runtime.device.name,
            self.tag.name
        )
    }
}

/// One detection, queued for the dispatch loop.
pub enum TagEvent {
    Heartbeat {
        ctx: Arc<TagContext>,
        payload: PayloadData,
        online: bool,
    },
    Trigger {
        ctx: Arc<TagContext>,
        payload: PayloadData,
    },
    Notice {
        ctx: Arc<TagContext>,
        payload: PayloadData,
        previous: Option<TagValue>,
    },
    /// The enable tag of a switch changed state.
    Switch {
        ctx: Arc<TagContext>,
        payload: PayloadData,
        on: bool,
    },
    /// Companion values read while a switch is on.
    SwitchSample {
        ctx: Arc<TagContext>,
        session: u64,
        values: Vec<PayloadData>,
    },
}

impl TagEvent {
    pub fn context(&self) -> &TagContext {
        match self {
            TagEvent::Heartbeat { ctx, .. }
            | TagEvent::Trigger { ctx, .. }
            | TagEvent::Notice { ctx, .. }
            | TagEvent::Switch { ctx, .. }
            | TagEvent::SwitchSample { ctx, .. } => ctx,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TagEvent::Heartbeat { .. } => "heartbeat",
            TagEvent::Trigger { .. } => "trigger",
            TagEvent::Notice { .. } => "notice",
            TagEvent::Switch { .. } => "switch",
            TagEvent::SwitchSample { .. } => "switch-sample",
        }
    }
}
