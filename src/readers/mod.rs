//! Driver contract consumed by the engine, the batched read path on top of
//! it, and the built-in simulator driver.
//!
//! Per-vendor byte encoding stays behind [`Driver`]; the engine only plans
//! requests and slices replies.

pub mod batch;
pub mod codec;
pub mod simulator;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::data_mgmt::models::{PayloadData, TagValue};
use crate::errors::TagError;
use crate::node_mgmt::topology::{Channel, Device, Tag};

pub use batch::{plan_batches, read_tags, write_tag, Batch};

/// One live connection to a controller.
#[async_trait]
pub trait Driver: Send {
    /// Largest request/reply the connection accepts, in bytes.
    fn max_pdu_size(&self) -> usize;

    async fn open(&mut self) -> Result<(), TagError>;

    async fn close(&mut self);

    /// Whether the connection can still carry requests.
    fn is_open(&self) -> bool;

    /// Read several addresses in one request. The reply is the concatenation
    /// of `lengths[i]` bytes per address, in request order.
    async fn read_batch(&mut self, addresses: &[&str], lengths: &[usize]) -> Result<Bytes, TagError>;

    async fn read(&mut self, tag: &Tag) -> Result<PayloadData, TagError> {
        let raw = self
            .read_batch(&[tag.address.as_str()], &[tag.wire_length()])
            .await?;
        let value = codec::decode(tag.data_type, tag.length, &raw)?;
        Ok(PayloadData::new(tag, value))
    }

    /// Write one tag and return the value actually sent, after coercion to
    /// the tag's data type.
    async fn write(&mut self, tag: &Tag, value: &TagValue) -> Result<TagValue, TagError>;
}

/// Builds driver instances for the devices of one driver kind. Each call
/// yields a fresh, unopened connection.
pub trait DriverFactory: Send + Sync {
    fn create(&self, channel: &Channel, device: &Device) -> Box<dyn Driver>;
}

/// Driver kinds known to this process, registered explicitly at startup.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn DriverFactory>) {
        let kind = kind.into();
        log::debug!("Registered driver kind '{}'", kind);
        self.factories.insert(kind, factory);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn DriverFactory>> {
        self.factories.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
