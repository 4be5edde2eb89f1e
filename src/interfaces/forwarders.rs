//! Outbound contracts the engine forwards tag data through. Transports
//! (HTTP, message bus, ...) implement these outside the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_mgmt::models::{PayloadData, TagValue};
use crate::errors::TagError;
use crate::helpers::rand_hex;
use crate::node_mgmt::topology::Flag;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ForwardMessage {
    pub id: String,
    pub flag: Flag,
    pub channel: String,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub tag: String,
    /// The firing tag first, then its companions in configured order.
    pub values: Vec<PayloadData>,
    pub created_at: DateTime<Utc>,
}

impl ForwardMessage {
    pub fn new(
        flag: Flag,
        channel: &str,
        device: &str,
        group: Option<&str>,
        tag: &str,
        values: Vec<PayloadData>,
    ) -> Self {
        Self {
            id: rand_hex(8),
            flag,
            channel: channel.to_string(),
            device: device.to_string(),
            group: group.map(str::to_string),
            tag: tag.to_string(),
            values,
            created_at: Utc::now(),
        }
    }

    pub fn value_of(&self, name: &str) -> Option<&TagValue> {
        self.values.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

/// Answer of a request forwarder to a trigger message.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForwardReply {
    pub success: bool,
    pub status_code: i64,
    /// Write-back tag name to value.
    #[serde(default)]
    pub callback_items: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ForwardReply {
    pub fn ok(status_code: i64) -> Self {
        Self {
            success: true,
            status_code,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ConnectivityForwarder: Send + Sync {
    async fn on_connectivity_changed(
        &self,
        channel: &str,
        device: &str,
        tag: &str,
        online: bool,
    ) -> Result<(), TagError>;
}

#[async_trait]
pub trait NoticeForwarder: Send + Sync {
    /// `previous` is the primary tag's value before this notice, if known.
    async fn publish(
        &self,
        message: &ForwardMessage,
        previous: Option<&TagValue>,
    ) -> Result<(), TagError>;
}

#[async_trait]
pub trait RequestForwarder: Send + Sync {
    async fn send(&self, message: &ForwardMessage) -> Result<ForwardReply, TagError>;
}

#[async_trait]
pub trait StreamForwarder: Send + Sync {
    async fn on_start(&self, message: &ForwardMessage) -> Result<(), TagError>;

    async fn on_sample(&self, message: &ForwardMessage) -> Result<(), TagError>;

    async fn on_stop(&self, message: &ForwardMessage) -> Result<(), TagError>;
}

/// The forwarders an engine delivers to. Any of them may be absent; at most
/// one request forwarder is registered.
#[derive(Clone, Default)]
pub struct Forwarders {
    pub connectivity: Option<Arc<dyn ConnectivityForwarder>>,
    pub notice: Option<Arc<dyn NoticeForwarder>>,
    pub request: Option<Arc<dyn RequestForwarder>>,
    pub stream: Option<Arc<dyn StreamForwarder>>,
}

impl Forwarders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connectivity(mut self, f: Arc<dyn ConnectivityForwarder>) -> Self {
        self.connectivity = Some(f);
        self
    }

    pub fn with_notice(mut self, f: Arc<dyn NoticeForwarder>) -> Self {
        self.notice = Some(f);
        self
    }

    pub fn with_request(mut self, f: Arc<dyn RequestForwarder>) -> Self {
        self.request = Some(f);
        self
    }

    pub fn with_stream(mut self, f: Arc<dyn StreamForwarder>) -> Self {
        self.stream = Some(f);
        self
    }
}
