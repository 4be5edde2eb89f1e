use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::helpers::millis;

/// Engine-wide knobs. Immutable once loaded; per-device overrides live on
/// [`Device`](super::topology::Device).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub mailbox_capacity: usize,
    pub pool_max_size: usize,
    pub pool_expiry_ms: u64,
    pub pool_sweep_delay_ms: u64,
    pub pool_sweep_interval_ms: u64,
    pub pool_acquire_poll_ms: u64,
    pub trigger_armed_value: i64,
    /// Upper bound on request size, applied on top of what the driver
    /// advertises.
    pub max_pdu_size: Option<usize>,
    pub forward_timeout_ms: u64,
    pub default_scan_rate_ms: u64,
    pub switch_sample_rate_ms: u64,
    /// SQLite file mirroring undelivered trigger acknowledgements.
    pub ack_ledger_path: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: defaults::MAILBOX_CAPACITY,
            pool_max_size: defaults::POOL_MAX_SIZE,
            pool_expiry_ms: defaults::POOL_EXPIRY.as_millis() as u64,
            pool_sweep_delay_ms: defaults::POOL_SWEEP_DELAY.as_millis() as u64,
            pool_sweep_interval_ms: defaults::POOL_SWEEP_INTERVAL.as_millis() as u64,
            pool_acquire_poll_ms: defaults::POOL_ACQUIRE_POLL.as_millis() as u64,
            trigger_armed_value: defaults::TRIGGER_ARMED_VALUE,
            max_pdu_size: None,
            forward_timeout_ms: defaults::FORWARD_TIMEOUT.as_millis() as u64,
            default_scan_rate_ms: defaults::SCAN_RATE.as_millis() as u64,
            switch_sample_rate_ms: defaults::SWITCH_SAMPLE_RATE.as_millis() as u64,
            ack_ledger_path: None,
        }
    }
}

impl EngineSettings {
    pub fn pool_expiry(&self) -> Duration {
        millis(self.pool_expiry_ms)
    }

    pub fn pool_sweep_delay(&self) -> Duration {
        millis(self.pool_sweep_delay_ms)
    }

    pub fn pool_sweep_interval(&self) -> Duration {
        millis(self.pool_sweep_interval_ms)
    }

    pub fn pool_acquire_poll(&self) -> Duration {
        millis(self.pool_acquire_poll_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        millis(self.forward_timeout_ms)
    }

    pub fn default_scan_rate(&self) -> Duration {
        millis(self.default_scan_rate_ms)
    }

    pub fn switch_sample_rate(&self) -> Duration {
        millis(self.switch_sample_rate_ms)
    }
}
