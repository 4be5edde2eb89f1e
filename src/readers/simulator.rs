//! In-memory controller used by `tagex run` and by the test-suite.
//!
//! Every connection of a device shares one [`SimDevice`] image that stores
//! encoded bytes per address, using the same layout as the codec.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;

use super::{codec, Driver, DriverFactory};
use crate::constants::defaults;
use crate::data_mgmt::models::TagValue;
use crate::errors::TagError;
use crate::node_mgmt::topology::{Channel, Device, Tag};

pub const DRIVER_KIND: &str = "simulator";

pub struct SimDevice {
    memory: DashMap<String, Vec<u8>>,
    max_pdu_size: usize,
    reachable: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    opens: AtomicUsize,
    batch_reads: AtomicUsize,
    writes: Mutex<Vec<(String, TagValue)>>,
}

impl SimDevice {
    pub fn new(max_pdu_size: usize) -> Arc<Self> {
        Arc::new(Self {
            memory: DashMap::new(),
            max_pdu_size,
            reachable: AtomicBool::new(true),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            batch_reads: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        })
    }

    /// Store a value as the device would hold it.
    pub fn set_value(&self, tag: &Tag, value: &TagValue) -> Result<(), TagError> {
        let raw = codec::encode(tag.data_type, tag.length, value)?;
        self.memory.insert(tag.address.clone(), raw);
        Ok(())
    }

    pub fn value(&self, tag: &Tag) -> Option<TagValue> {
        let raw = self.memory.get(&tag.address)?;
        codec::decode(tag.data_type, tag.length, &raw).ok()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn batch_read_count(&self) -> usize {
        self.batch_reads.load(Ordering::SeqCst)
    }

    /// Every write so far, as (address, value sent).
    pub fn writes(&self) -> Vec<(String, TagValue)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_raw(&self, address: &str, len: usize) -> Vec<u8> {
        let mut raw = self
            .memory
            .get(address)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        raw.resize(len, 0);
        raw
    }
}

pub struct SimulatorDriver {
    device: Arc<SimDevice>,
    open: bool,
}

impl SimulatorDriver {
    pub fn new(device: Arc<SimDevice>) -> Self {
        Self {
            device,
            open: false,
        }
    }

    fn ensure_open(&self) -> Result<(), TagError> {
        if self.open {
            Ok(())
        } else {
            Err(TagError::io("simulated connection is not open"))
        }
    }
}

#[async_trait]
impl Driver for SimulatorDriver {
    fn max_pdu_size(&self) -> usize {
        self.device.max_pdu_size
    }

    async fn open(&mut self) -> Result<(), TagError> {
        if !self.device.reachable.load(Ordering::SeqCst) {
            return Err(TagError::io("simulated device refused the connection"));
        }
        self.device.opens.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open && self.device.reachable.load(Ordering::SeqCst)
    }

    async fn read_batch(&mut self, addresses: &[&str], lengths: &[usize]) -> Result<Bytes, TagError> {
        self.ensure_open()?;
        if self.device.fail_reads.load(Ordering::SeqCst) {
            return Err(TagError::io("simulated read failure"));
        }
        let total: usize = lengths.iter().sum();
        if total > self.max_pdu_size() {
            return Err(TagError::io(format!(
                "request of {total} bytes exceeds PDU size {}",
                self.max_pdu_size()
            )));
        }

        self.device.batch_reads.fetch_add(1, Ordering::SeqCst);
        let mut reply = BytesMut::with_capacity(total);
        for (address, len) in addresses.iter().zip(lengths) {
            reply.extend_from_slice(&self.device.read_raw(address, *len));
        }
        Ok(reply.freeze())
    }

    async fn write(&mut self, tag: &Tag, value: &TagValue) -> Result<TagValue, TagError> {
        self.ensure_open()?;
        if self.device.fail_writes.load(Ordering::SeqCst) {
            return Err(TagError::io("simulated write failure"));
        }
        let raw = codec::encode(tag.data_type, tag.length, value)?;
        let sent = codec::decode(tag.data_type, tag.length, &raw)?;
        self.device.memory.insert(tag.address.clone(), raw);
        self.device
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((tag.address.clone(), sent.clone()));
        Ok(sent)
    }
}

/// Hands out simulator connections; devices are keyed by device id and
/// created on first use.
pub struct SimulatorFactory {
    devices: DashMap<u32, Arc<SimDevice>>,
    default_pdu_size: usize,
}

impl Default for SimulatorFactory {
    fn default() -> Self {
        Self::new(defaults::MAX_PDU_SIZE)
    }
}

impl SimulatorFactory {
    pub fn new(default_pdu_size: usize) -> Self {
        Self {
            devices: DashMap::new(),
            default_pdu_size,
        }
    }

    pub fn device(&self, device_id: u32) -> Arc<SimDevice> {
        self.devices
            .entry(device_id)
            .or_insert_with(|| SimDevice::new(self.default_pdu_size))
            .value()
            .clone()
    }
}

impl DriverFactory for SimulatorFactory {
    fn create(&self, _channel: &Channel, device: &Device) -> Box<dyn Driver> {
        Box::new(SimulatorDriver::new(self.device(device.id)))
    }
}
