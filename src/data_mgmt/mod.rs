pub mod ack_ledger;
pub mod models;
pub mod snapshot;

pub use ack_ledger::{AckLedger, PendingAck};
pub use models::{PayloadData, TagValue};
pub use snapshot::{SnapshotEntry, SnapshotStore};
