use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::models::PayloadData;
use crate::node_mgmt::topology::TagId;

#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotEntry {
    pub payload: PayloadData,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1, grows by one per `set`.
    pub version: u64,
}

/// Last known value per tag id. Writers to different tags never contend;
/// writers to the same tag are serialised by the map shard and the last one
/// wins.
#[derive(Default)]
pub struct SnapshotStore {
    entries: DashMap<TagId, SnapshotEntry, ahash::RandomState>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag_id: TagId) -> Option<SnapshotEntry> {
        self.entries.get(&tag_id).map(|e| e.value().clone())
    }

    /// Replace the entry for the payload's tag and return the one it replaced.
    pub fn set(&self, payload: PayloadData) -> Option<SnapshotEntry> {
        let updated_at = Utc::now();
        match self.entries.entry(payload.tag_id) {
            Entry::Occupied(mut occupied) => {
                let version = occupied.get().version + 1;
                Some(occupied.insert(SnapshotEntry {
                    payload,
                    updated_at,
                    version,
                }))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SnapshotEntry {
                    payload,
                    updated_at,
                    version: 1,
                });
                None
            }
        }
    }

    pub fn set_many(&self, payloads: impl IntoIterator<Item = PayloadData>) {
        for payload in payloads {
            self.set(payload);
        }
    }

    pub fn clear(&self) {
        let n = self.entries.len();
        self.entries.clear();
        log::debug!("Cleared {} snapshot entries", n);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
