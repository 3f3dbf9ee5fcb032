//! Small clock helpers shared across the engine.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a local placeholder id for a message awaiting server confirmation.
///
/// Derived from the current nanosecond so two sends in the same session never
/// collide. The id is replaced by the canonical server id on confirmation.
pub fn pending_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("pending-{}", nanos)
}
