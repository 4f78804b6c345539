//! Shared primitives for the scan core: identifiers, timestamps, and the
//! error enums each crate boundary narrows its own errors into.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod ids;

pub use ids::*;

/// Milliseconds since the Unix epoch, used throughout for history, message,
/// and issue timestamps.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
    }

    #[test]
    fn new_uuid_is_unique() {
        assert_ne!(new_uuid(), new_uuid());
    }
}
