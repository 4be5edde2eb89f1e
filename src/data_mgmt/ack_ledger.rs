//! Trigger acknowledgements that could not be written back yet.
//!
//! Entries live in memory and, when a ledger file is configured, are
//! mirrored to the key-value store under `pending_ack/<tag id>` so a restart
//! picks them up again.

use std::path::Path;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kvstore::{AsyncKVDb, KVStoreError};
use serde::{Deserialize, Serialize};

use crate::constants::keys;
use crate::node_mgmt::topology::TagId;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PendingAck {
    /// The trigger tag the acknowledgement belongs to.
    pub tag_id: TagId,
    pub device_id: u32,
    pub status_code: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct AckLedger {
    pending: DashMap<TagId, PendingAck>,
    store: Option<AsyncKVDb>,
}

fn key_for(tag_id: TagId) -> String {
    format!("{}/{}", keys::PENDING_ACK_PFX, tag_id)
}

impl AckLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) the ledger file and load every outstanding entry.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        let store = AsyncKVDb::new(path).await?;
        let entries: Vec<(String, PendingAck)> =
            store.entries_with_prefix(keys::PENDING_ACK_PFX).await?;
        let pending = DashMap::new();
        for (_, ack) in entries {
            pending.insert(ack.tag_id, ack);
        }
        if !pending.is_empty() {
            log::info!(
                "Loaded {} outstanding acknowledgement(s) from {}",
                pending.len(),
                store.path().display()
            );
        }
        Ok(Self {
            pending,
            store: Some(store),
        })
    }

    pub async fn mark(&self, ack: PendingAck) {
        log::warn!(
            "Recording pending ack {} for tag {}",
            ack.status_code,
            ack.tag_id
        );
        if let Some(store) = &self.store {
            if let Err(e) = store.set(key_for(ack.tag_id), &ack).await {
                log::error!("Could not persist pending ack for tag {}: {}", ack.tag_id, e);
            }
        }
        self.pending.insert(ack.tag_id, ack);
    }

    pub fn pending(&self, tag_id: TagId) -> Option<PendingAck> {
        self.pending.get(&tag_id).map(|a| a.value().clone())
    }

    pub async fn clear(&self, tag_id: TagId) {
        if self.pending.remove(&tag_id).is_none() {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(key_for(tag_id)).await {
                log::error!("Could not remove pending ack for tag {}: {}", tag_id, e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ack(tag_id: TagId, status_code: i64) -> PendingAck {
        PendingAck {
            tag_id,
            device_id: 1,
            status_code,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_mark_and_clear() {
        let ledger = AckLedger::in_memory();
        ledger.mark(ack(3, 0)).await;
        assert_eq!(ledger.pending(3).map(|a| a.status_code), Some(0));

        ledger.mark(ack(3, 4)).await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending(3).map(|a| a.status_code), Some(4));

        ledger.clear(3).await;
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("acks.db");

        let ledger = AckLedger::open(&path).await.unwrap();
        ledger.mark(ack(1, 0)).await;
        ledger.mark(ack(2, 6)).await;
        ledger.clear(1).await;
        drop(ledger);

        let reopened = AckLedger::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.pending(1).is_none());
        assert_eq!(reopened.pending(2).map(|a| a.status_code), Some(6));
    }
}
