//! BPH ledger entries as persisted in the store.
//!
//! A BPH entry records "this many boops were admitted at a time that
//! expires at `valid_until`". On the wire to the store it is the JSON
//! array `[validUntil, change]` under `bph/<clientId>/<pushKey>`.
//!
//! Decoding is strict: anything that is not a two-element array of
//! positive integers is reported as malformed so the caller can
//! schedule the offending key for removal without corrupting its
//! local mirror.

use serde_json::Value;

use crate::time::EpochMs;
use crate::{BoopdError, Result};

// ---------------------------------------------------------------------------
// BphEntry
// ---------------------------------------------------------------------------

/// One hourly rate-limit ledger entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BphEntry {
    /// Epoch-ms instant after which the entry no longer counts
    /// against the hourly limit.
    pub valid_until: EpochMs,
    /// Number of boops this entry accounts for. Always positive.
    pub change: u64,
}

impl BphEntry {
    /// Creates an entry; `change` must be positive.
    pub fn new(valid_until: EpochMs, change: u64) -> Self {
        debug_assert!(change > 0, "BPH entries account for at least one boop");
        Self { valid_until, change }
    }

    /// Decodes a store value into an entry.
    ///
    /// # Errors
    ///
    /// Returns [`BoopdError::ProtocolError`] unless the value is a
    /// two-element array of integers with `validUntil > 0` and
    /// `change > 0`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let malformed = |reason: String| BoopdError::ProtocolError { reason };

        let items = value
            .as_array()
            .ok_or_else(|| malformed(format!("BPH entry is not an array: {value}")))?;

        if items.len() != 2 {
            return Err(malformed(format!(
                "BPH entry has {} elements, expected 2",
                items.len()
            )));
        }

        let valid_until = items[0]
            .as_u64()
            .filter(|v| *v > 0)
            .ok_or_else(|| malformed(format!("BPH validUntil invalid: {}", items[0])))?;

        let change = items[1]
            .as_u64()
            .filter(|v| *v > 0)
            .ok_or_else(|| malformed(format!("BPH change invalid: {}", items[1])))?;

        Ok(Self { valid_until, change })
    }

    /// Encodes the entry as its store representation.
    pub fn to_value(&self) -> Value {
        Value::Array(vec![self.valid_until.into(), self.change.into()])
    }

    /// True once the janitor grace period past `valid_until` has also
    /// elapsed and the entry may be swept.
    pub fn sweepable(&self, now: EpochMs, grace_ms: u64) -> bool {
        self.valid_until.saturating_add(grace_ms) < now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip() -> Result<()> {
        let entry = BphEntry::new(1_700_000_000_000, 42);
        let decoded = BphEntry::from_value(&entry.to_value())?;
        assert_eq!(entry, decoded);
        Ok(())
    }

    #[test]
    fn rejects_non_array() {
        assert!(BphEntry::from_value(&json!({"validUntil": 1})).is_err());
        assert!(BphEntry::from_value(&json!("[1, 2]")).is_err());
        assert!(BphEntry::from_value(&json!(null)).is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(BphEntry::from_value(&json!([1])).is_err());
        assert!(BphEntry::from_value(&json!([1, 2, 3])).is_err());
        assert!(BphEntry::from_value(&json!([])).is_err());
    }

    #[test]
    fn rejects_non_positive_fields() {
        assert!(BphEntry::from_value(&json!([0, 5])).is_err());
        assert!(BphEntry::from_value(&json!([1_000, 0])).is_err());
        assert!(BphEntry::from_value(&json!([-5, 1])).is_err());
        assert!(BphEntry::from_value(&json!([1_000, -1])).is_err());
    }

    #[test]
    fn rejects_non_numeric_fields() {
        assert!(BphEntry::from_value(&json!(["soon", 5])).is_err());
        assert!(BphEntry::from_value(&json!([1_000, "many"])).is_err());
        assert!(BphEntry::from_value(&json!([1.5, 5])).is_err());
    }

    #[test]
    fn sweepable_only_after_grace() {
        let entry = BphEntry::new(1_000, 7);
        let grace = 3_600_000;
        assert!(!entry.sweepable(1_000 + grace, grace));
        assert!(entry.sweepable(1_000 + grace + 1, grace));
    }
}
