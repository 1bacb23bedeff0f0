//! Local mirror of one client's hourly rate-limit ledger.
//!
//! The durable truth lives under `bph/<clientId>` in the store; this
//! module mirrors it through the child subscription, tracks the two
//! running sums the rate limiter needs, and drives the append cycle
//! that turns locally admitted boops into durable entries.
//!
//! Entry expiry is tracked here as a set of wall-clock deadlines; the
//! session's event loop sleeps until [`next_expiry`](BphLedger::next_expiry)
//! and issues the store removals. The store's removal echo — not the
//! timer — is what finally drops an entry from the mirror, so the sums
//! always match what the store holds.

use std::collections::BTreeMap;

use serde_json::Value;

use boopd_types::time::EpochMs;
use boopd_types::BphEntry;

// ---------------------------------------------------------------------------
// Apply outcomes
// ---------------------------------------------------------------------------

/// Result of applying a child-added event to the mirror.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApplyOutcome {
    /// New entry mirrored.
    Inserted,
    /// Known key re-delivered; the mirror was re-balanced with the
    /// new value.
    Replaced,
    /// The store datum is malformed; the mirror is untouched and the
    /// caller must schedule the key for removal.
    Malformed,
}

// ---------------------------------------------------------------------------
// BphLedger
// ---------------------------------------------------------------------------

struct MirrorEntry {
    entry: BphEntry,
    /// A removal for this key is already on its way to the store; the
    /// expiry timer must not fire for it again.
    remove_issued: bool,
}

/// Mirror of `bph/<clientId>` plus the unsynced-admissions counter.
#[derive(Default)]
pub struct BphLedger {
    mirror: BTreeMap<String, MirrorEntry>,
    last_sum: u64,
    unsynced: u64,
}

impl BphLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of `change` across the mirror.
    pub fn last_sum(&self) -> u64 {
        self.last_sum
    }

    /// Admitted boops not yet appended as a ledger entry.
    pub fn unsynced(&self) -> u64 {
        self.unsynced
    }

    /// What currently counts against the hourly limit.
    pub fn hourly_total(&self) -> u64 {
        self.last_sum + self.unsynced
    }

    /// Number of mirrored entries.
    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    /// True when nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    /// Counts one admitted boop.
    pub fn record_boop(&mut self) {
        self.unsynced += 1;
    }

    /// Mirror entries sorted ascending by `valid_until`, the order the
    /// limiter walks them in.
    pub fn entries_by_expiry(&self) -> Vec<BphEntry> {
        let mut entries: Vec<BphEntry> = self.mirror.values().map(|m| m.entry).collect();
        entries.sort_by_key(|e| e.valid_until);
        entries
    }

    // -----------------------------------------------------------------------
    // Subscription application
    // -----------------------------------------------------------------------

    /// Applies a child-added event (or an initial-snapshot entry).
    ///
    /// Re-delivery of a known key replaces the stored entry and
    /// re-balances `last_sum`, which makes the subscribe-then-read
    /// initialization window safe.
    pub fn apply_child_added(&mut self, key: &str, value: &Value) -> ApplyOutcome {
        let entry = match BphEntry::from_value(value) {
            Ok(entry) => entry,
            Err(_) => return ApplyOutcome::Malformed,
        };

        match self.mirror.insert(
            key.to_owned(),
            MirrorEntry {
                entry,
                remove_issued: false,
            },
        ) {
            None => {
                self.last_sum += entry.change;
                ApplyOutcome::Inserted
            }
            Some(previous) => {
                self.last_sum = self.last_sum - previous.entry.change + entry.change;
                ApplyOutcome::Replaced
            }
        }
    }

    /// Applies a child-removed event. Returns `false` for unknown
    /// keys (the caller warns and moves on).
    pub fn apply_child_removed(&mut self, key: &str) -> bool {
        match self.mirror.remove(key) {
            Some(removed) => {
                self.last_sum -= removed.entry.change;
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Expiry scheduling
    // -----------------------------------------------------------------------

    /// Earliest `valid_until` among entries whose removal has not been
    /// issued yet.
    pub fn next_expiry(&self) -> Option<EpochMs> {
        self.mirror
            .values()
            .filter(|m| !m.remove_issued)
            .map(|m| m.entry.valid_until)
            .min()
    }

    /// Keys whose `valid_until` has passed, marked so the deadline is
    /// not rearmed for them. The entries stay mirrored until the
    /// store's removal echo arrives.
    pub fn take_due(&mut self, now: EpochMs) -> Vec<String> {
        let mut due = Vec::new();
        for (key, mirrored) in self.mirror.iter_mut() {
            if !mirrored.remove_issued && mirrored.entry.valid_until <= now {
                mirrored.remove_issued = true;
                due.push(key.clone());
            }
        }
        due
    }

    // -----------------------------------------------------------------------
    // Append cycle
    // -----------------------------------------------------------------------

    /// Starts an append cycle: snapshots and zeroes the unsynced
    /// counter. `None` when there is nothing to append.
    pub fn begin_sync(&mut self) -> Option<u64> {
        if self.unsynced == 0 {
            return None;
        }
        Some(std::mem::take(&mut self.unsynced))
    }

    /// Restores the unsynced counter after a failed append; the next
    /// cycle retries.
    pub fn fail_sync(&mut self, change: u64) {
        self.unsynced += change;
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
    fn sum_tracks_additions_and_removals() {
        let mut ledger = BphLedger::new();

        assert_eq!(ledger.apply_child_added("a", &json!([100, 3])), ApplyOutcome::Inserted);
        assert_eq!(ledger.apply_child_added("b", &json!([200, 4])), ApplyOutcome::Inserted);
        assert_eq!(ledger.last_sum(), 7);

        assert!(ledger.apply_child_removed("a"));
        assert_eq!(ledger.last_sum(), 4);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn redelivery_replaces_without_double_counting() {
        let mut ledger = BphLedger::new();
        ledger.apply_child_added("a", &json!([100, 3]));
        assert_eq!(ledger.apply_child_added("a", &json!([100, 3])), ApplyOutcome::Replaced);
        assert_eq!(ledger.last_sum(), 3);

        assert_eq!(ledger.apply_child_added("a", &json!([100, 5])), ApplyOutcome::Replaced);
        assert_eq!(ledger.last_sum(), 5);
    }

    #[test]
    fn malformed_values_leave_the_mirror_untouched() {
        let mut ledger = BphLedger::new();
        ledger.apply_child_added("ok", &json!([100, 2]));

        for bad in [json!("nope"), json!([1]), json!([0, 5]), json!([100, 0])] {
            assert_eq!(ledger.apply_child_added("bad", &bad), ApplyOutcome::Malformed);
        }
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.last_sum(), 2);
    }

    #[test]
    fn unknown_removal_is_reported() {
        let mut ledger = BphLedger::new();
        assert!(!ledger.apply_child_removed("ghost"));
    }

    #[test]
    fn hourly_total_includes_unsynced() {
        let mut ledger = BphLedger::new();
        ledger.apply_child_added("a", &json!([100, 3]));
        ledger.record_boop();
        ledger.record_boop();
        assert_eq!(ledger.hourly_total(), 5);
    }

    #[test]
    fn sync_cycle_snapshots_and_restores() {
        let mut ledger = BphLedger::new();
        assert_eq!(ledger.begin_sync(), None);

        ledger.record_boop();
        ledger.record_boop();
        let change = ledger.begin_sync().expect("two boops pending");
        assert_eq!(change, 2);
        assert_eq!(ledger.unsynced(), 0);

        // Repeated sync with nothing pending is a no-op.
        assert_eq!(ledger.begin_sync(), None);

        ledger.fail_sync(change);
        assert_eq!(ledger.unsynced(), 2);
    }

    #[test]
    fn expiry_deadlines_skip_issued_keys() {
        let mut ledger = BphLedger::new();
        ledger.apply_child_added("a", &json!([100, 1]));
        ledger.apply_child_added("b", &json!([200, 1]));
        assert_eq!(ledger.next_expiry(), Some(100));

        let due = ledger.take_due(150);
        assert_eq!(due, vec!["a".to_string()]);
        assert_eq!(ledger.next_expiry(), Some(200));

        // Issued but not yet echoed: still mirrored, still counted.
        assert_eq!(ledger.last_sum(), 2);

        // The store echo finally drops it.
        assert!(ledger.apply_child_removed("a"));
        assert_eq!(ledger.last_sum(), 1);
    }

    #[test]
    fn entries_come_back_sorted_by_expiry() {
        let mut ledger = BphLedger::new();
        ledger.apply_child_added("late", &json!([300, 1]));
        ledger.apply_child_added("early", &json!([100, 2]));
        ledger.apply_child_added("mid", &json!([200, 3]));

        let order: Vec<u64> = ledger
            .entries_by_expiry()
            .iter()
            .map(|e| e.valid_until)
            .collect();
        assert_eq!(order, vec![100, 200, 300]);
    }
}
