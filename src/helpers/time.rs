use std::time::Duration;

/// Millisecond setting to `Duration`, clamped to at least 1ms so a zero never
/// turns an interval into a busy loop.
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}
