//! Coalescing scheduler for global-counter writes.
//!
//! Local admissions accumulate in `unsynced` and are flushed as one
//! atomic add against `gbc` at most once per interval, bounding the
//! store's write rate per session while the optimistic display
//! (`last_gbc + unsynced`) keeps the client's count live.
//!
//! The original promise-chained coalescing is expressed as a
//! single-flight flag plus a "sync requested" boolean: a second
//! request while a write is in flight just marks the flag, and the
//! completion handler re-enters if the interval has elapsed again.

use boopd_types::time::EpochMs;

/// Single-flight write scheduler for the shared counter.
pub struct GbcScheduler {
    interval_ms: u64,

    /// Most recent store value, optimistically advanced by deltas we
    /// have in flight.
    last_gbc: u64,
    /// Admitted boops not yet added to the store.
    unsynced: u64,
    /// Wall clock of the last attempted write.
    last_sync: EpochMs,
    /// A write is currently in flight.
    in_flight: bool,
    /// A sync was requested while one was in flight.
    resync_requested: bool,
}

impl GbcScheduler {
    /// Creates a scheduler; [`seed`](Self::seed) must run before the
    /// first boop.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_gbc: 0,
            unsynced: 0,
            last_sync: 0,
            in_flight: false,
            resync_requested: false,
        }
    }

    /// Seeds the counter from the initial store read and starts the
    /// interval clock, so boops inside the first interval coalesce
    /// instead of writing immediately.
    pub fn seed(&mut self, value: u64, now: EpochMs) {
        self.last_gbc = value;
        self.last_sync = now;
    }

    /// The value shown to the client.
    pub fn displayed(&self) -> u64 {
        self.last_gbc + self.unsynced
    }

    /// Most recent store value (plus in-flight deltas).
    pub fn last_gbc(&self) -> u64 {
        self.last_gbc
    }

    /// Admitted boops not yet written.
    pub fn unsynced(&self) -> u64 {
        self.unsynced
    }

    /// Counts one admitted boop.
    pub fn record_boop(&mut self) {
        self.unsynced += 1;
    }

    /// Starts a write if one is due, returning the delta to add.
    ///
    /// Ordinary requests coalesce with an in-flight write and respect
    /// the interval. A final sync (shutdown flush) bypasses both — the
    /// in-flight delta was already moved out of `unsynced`, so the
    /// final write never double-counts it.
    pub fn begin_sync(&mut self, now: EpochMs, final_sync: bool) -> Option<u64> {
        if !final_sync {
            if self.in_flight {
                self.resync_requested = true;
                return None;
            }
            if now.saturating_sub(self.last_sync) < self.interval_ms {
                return None;
            }
        }
        if self.unsynced == 0 {
            return None;
        }

        self.last_sync = now;
        let change = std::mem::take(&mut self.unsynced);
        // Advance optimistically so the store's echo of our own write
        // arrives as "unchanged" and emits no duplicate count frame.
        self.last_gbc += change;
        self.in_flight = !final_sync;
        Some(change)
    }

    /// Records a write outcome. On failure both sides of the
    /// optimistic advance are rolled back so the displayed value
    /// neither drops nor double-counts. Returns whether a coalesced
    /// request arrived meanwhile and the caller should re-enter.
    pub fn complete_sync(&mut self, change: u64, ok: bool) -> bool {
        self.in_flight = false;
        if !ok {
            self.last_gbc = self.last_gbc.saturating_sub(change);
            self.unsynced += change;
        }
        std::mem::take(&mut self.resync_requested)
    }

    /// Applies an externally observed counter value. Returns `true`
    /// when the value changed and a count frame should be emitted.
    pub fn observe_remote(&mut self, value: u64) -> bool {
        if value == self.last_gbc {
            return false;
        }
        self.last_gbc = value;
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
