//! Per-flag detection rules. Pure state machines fed one read at a time.

use crate::data_mgmt::models::TagValue;
use crate::data_mgmt::snapshot::SnapshotEntry;
use crate::node_mgmt::topology::PublishMode;

/// Fires once per transition into the armed value.
#[derive(Debug)]
pub struct TriggerDetector {
    armed: i64,
    last: Option<i64>,
}

impl TriggerDetector {
    pub fn new(armed: i64) -> Self {
        Self { armed, last: None }
    }

    pub fn observe(&mut self, value: &TagValue) -> bool {
        let current = value.as_i64();
        let fire = current == Some(self.armed) && self.last != Some(self.armed);
        self.last = current;
        fire
    }
}

#[derive(Debug)]
struct ExpectedAck {
    value: bool,
    /// Snapshot version of the tag when the change was detected.
    after_version: u64,
}

/// Fires whenever the boolean reading changes. With auto-acknowledge the
/// complement does not fire when the engine wrote it back, i.e. the tag's
/// snapshot entry was updated to it after the detection.
#[derive(Debug)]
pub struct HeartbeatDetector {
    auto_ack: bool,
    last: Option<bool>,
    expected: Option<ExpectedAck>,
}

impl HeartbeatDetector {
    pub fn new(auto_ack: bool) -> Self {
        Self {
            auto_ack,
            last: None,
            expected: None,
        }
    }

    /// `recorded` is the tag's current snapshot entry.
    pub fn observe(&mut self, value: &TagValue, recorded: Option<&SnapshotEntry>) -> Option<bool> {
        let current = value.as_bool()?;
        if self.last == Some(current) {
            return None;
        }
        self.last = Some(current);

        if let Some(expected) = self.expected.take() {
            let acknowledged = recorded.is_some_and(|e| {
                e.version > expected.after_version && e.payload.value.as_bool() == Some(current)
            });
            if expected.value == current && acknowledged {
                return None;
            }
        }
        if self.auto_ack {
            self.expected = Some(ExpectedAck {
                value: !current,
                after_version: recorded.map_or(0, |e| e.version),
            });
        }
        Some(current)
    }
}

pub fn notice_fires(mode: PublishMode, previous: Option<&TagValue>, current: &TagValue) -> bool {
    match mode {
        PublishMode::EveryScan => true,
        PublishMode::OnlyOnChange => previous != Some(current),
    }
}

/// Start/stop edges of a switch's enable tag. The first reading only counts
/// when it is already on.
#[derive(Debug, Default)]
pub struct SwitchDetector {
    last: Option<bool>,
}

impl SwitchDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: &TagValue) -> Option<bool> {
        let current = value.as_bool()?;
        let previous = self.last.replace(current);
        match previous {
            None if current => Some(true),
            Some(p) if p != current => Some(current),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_mgmt::models::PayloadData;
    use crate::data_mgmt::snapshot::SnapshotStore;
    use crate::node_mgmt::topology::Tag;

    fn ints(values: &[i32]) -> Vec<TagValue> {
        values.iter().map(|v| TagValue::Int32(*v)).collect()
    }

    #[test]
    fn trigger_fires_on_each_arming_edge() {
        let mut detector = TriggerDetector::new(1);
        let fired: Vec<usize> = ints(&[0, 1, 1, 1, 0, 1])
            .iter()
            .enumerate()
            .filter(|(_, v)| detector.observe(v))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![1, 5]);
    }

    #[test]
    fn trigger_fires_when_first_read_is_armed() {
        let mut detector = TriggerDetector::new(2);
        assert!(detector.observe(&TagValue::Int16(2)));
        assert!(!detector.observe(&TagValue::Int16(2)));
        assert!(!detector.observe(&TagValue::Int16(1)));
        assert!(detector.observe(&TagValue::Int16(2)));
    }

    fn bit(value: bool) -> PayloadData {
        let tag: Tag = serde_json::from_value(serde_json::json!({
            "id": 20, "name": "Alive", "address": "DB20.0", "data_type": "bit"
        }))
        .unwrap();
        PayloadData::new(&tag, TagValue::Bool(value))
    }

    #[test]
    fn heartbeat_reports_every_change() {
        let mut detector = HeartbeatDetector::new(false);
        let seen: Vec<Option<bool>> = [true, true, false, false, true]
            .iter()
            .map(|b| detector.observe(&TagValue::Bool(*b), None))
            .collect();
        assert_eq!(seen, vec![Some(true), None, Some(false), None, Some(true)]);
    }

    #[test]
    fn heartbeat_with_auto_ack_ignores_its_own_write() {
        let store = SnapshotStore::new();
        let mut detector = HeartbeatDetector::new(true);
        assert_eq!(detector.observe(&TagValue::Bool(true), store.get(20).as_ref()), Some(true));
        // read again before the acknowledge landed
        assert_eq!(detector.observe(&TagValue::Bool(true), store.get(20).as_ref()), None);

        // handler records the reading, then the complement it writes
        store.set(bit(true));
        store.set(bit(false));
        store.set(bit(false));
        assert_eq!(detector.observe(&TagValue::Bool(false), store.get(20).as_ref()), None);
        assert_eq!(detector.observe(&TagValue::Bool(true), store.get(20).as_ref()), Some(true));
    }

    #[test]
    fn heartbeat_reports_change_after_failed_acknowledge() {
        let store = SnapshotStore::new();
        store.set(bit(false));
        let mut detector = HeartbeatDetector::new(true);
        assert_eq!(detector.observe(&TagValue::Bool(false), store.get(20).as_ref()), Some(false));
        store.set(bit(false));
        store.set(bit(true));
        assert_eq!(detector.observe(&TagValue::Bool(true), store.get(20).as_ref()), None);

        assert_eq!(detector.observe(&TagValue::Bool(false), store.get(20).as_ref()), Some(false));
        // the acknowledge write failed: the reading is recorded again
        store.set(bit(false));
        store.set(bit(true));
        store.set(bit(false));
        assert_eq!(detector.observe(&TagValue::Bool(false), store.get(20).as_ref()), None);
        // the device changes by itself later
        assert_eq!(detector.observe(&TagValue::Bool(true), store.get(20).as_ref()), Some(true));
    }

    #[test]
    fn notice_respects_publish_mode() {
        let a = TagValue::Int16(1);
        let b = TagValue::Int16(2);
        assert!(notice_fires(PublishMode::EveryScan, Some(&a), &a));
        assert!(!notice_fires(PublishMode::OnlyOnChange, Some(&a), &a));
        assert!(notice_fires(PublishMode::OnlyOnChange, Some(&a), &b));
        assert!(notice_fires(PublishMode::OnlyOnChange, None, &a));
    }

    #[test]
    fn switch_reports_start_and_stop() {
        let mut detector = SwitchDetector::new();
        assert_eq!(detector.observe(&TagValue::Bool(false)), None);
        assert_eq!(detector.observe(&TagValue::Bool(true)), Some(true));
        assert_eq!(detector.observe(&TagValue::Bool(true)), None);
        assert_eq!(detector.observe(&TagValue::Bool(false)), Some(false));

        let mut detector = SwitchDetector::new();
        assert_eq!(detector.observe(&TagValue::Word(1)), Some(true));
    }
}
