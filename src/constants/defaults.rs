use std::time::Duration;

pub const LOG_LEVEL: &str = "INFO";
pub const CONFIG_PATH: &str = "tagex.json";

pub const MAILBOX_CAPACITY: usize = 1024;

pub const POOL_MAX_SIZE: usize = 4;
pub const POOL_EXPIRY: Duration = Duration::from_secs(30);
pub const POOL_SWEEP_DELAY: Duration = Duration::from_secs(10);
pub const POOL_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const POOL_ACQUIRE_POLL: Duration = Duration::from_millis(10);

pub const TRIGGER_ARMED_VALUE: i64 = 1;
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);
pub const SCAN_RATE: Duration = Duration::from_millis(100);
pub const SWITCH_SAMPLE_RATE: Duration = Duration::from_millis(50);

/// Ceiling used when neither the device nor the driver advertises one
/// (S7 default negotiated PDU size).
pub const MAX_PDU_SIZE: usize = 240;
