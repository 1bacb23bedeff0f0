//! Epoch-millisecond clock helpers.
//!
//! All rate windows, ledger expiries, and sync deadlines are expressed
//! as wall-clock epoch milliseconds so they line up with the
//! `validUntil` values persisted in the store. Monotonic deadlines
//! (heartbeat, interval ticks) use `tokio::time` instead and never
//! appear here.

use chrono::Utc;

/// Wall-clock instant in milliseconds since the Unix epoch.
///
/// Values fit comfortably inside the 53-bit safe-integer range the
/// wire protocol allows (11 base-36 digits).
pub type EpochMs = u64;

/// Returns the current wall-clock time in epoch milliseconds.
pub fn now_ms() -> EpochMs {
    // timestamp_millis() is negative only for pre-1970 clocks; clamp
    // rather than wrap so a badly set clock cannot underflow windows.
    Utc::now().timestamp_millis().max(0) as EpochMs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_past_2020() {
        // 2020-01-01T00:00:00Z in epoch ms.
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn now_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
