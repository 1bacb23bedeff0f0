//! Two-window rate limiter: a short in-memory window (BPM) and a long
//! window backed by the durable ledger (BPH).
//!
//! The limiter owns the per-session cooldown state; the hourly sums
//! live in the [`BphLedger`](crate::ledger::BphLedger) so they survive
//! disconnects. All arithmetic is integer epoch-milliseconds.

use std::collections::VecDeque;

use boopd_types::config::AppConfig;
use boopd_types::time::EpochMs;

use crate::ledger::BphLedger;

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Outcome of one boop request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    /// Admitted; the caller counts it and replies `b` then `c`.
    Admitted,
    /// Rejected; the caller replies `r` with the remaining cooldown.
    Rejected {
        /// Remaining cooldown in milliseconds.
        cooldown_ms: u64,
    },
    /// Rejected, and the abuse limit is reached: reply `r`, then
    /// close the channel with code 1002.
    RejectedAndClose {
        /// Remaining cooldown in milliseconds.
        cooldown_ms: u64,
    },
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Per-session admission control.
pub struct RateLimiter {
    bpm_limit: usize,
    bpm_window_ms: u64,
    bph_limit: u64,
    bph_window_ms: u64,
    fail_limit: u32,

    /// Timestamps of recently admitted boops, pruned to the last
    /// `bpm_window_ms`.
    bpm_window: VecDeque<EpochMs>,
    /// 0 means no active cooldown.
    cooldown_until: EpochMs,
    /// Consecutive rejections during an active cooldown.
    cooldown_fails: u32,
}

impl RateLimiter {
    /// Creates a limiter from the session configuration.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            bpm_limit: config.bpm_limit as usize,
            bpm_window_ms: config.bpm_window_ms,
            bph_limit: config.bph_limit,
            bph_window_ms: config.bph_window_ms,
            fail_limit: config.cooldown_fail_limit,
            bpm_window: VecDeque::new(),
            cooldown_until: 0,
            cooldown_fails: 0,
        }
    }

    /// Handles one boop request at `now`.
    pub fn on_boop(&mut self, now: EpochMs, ledger: &BphLedger) -> Admission {
        // Requests during an active cooldown are rejected outright;
        // persistence past the fail limit closes the channel.
        if self.cooldown_until != 0 && now < self.cooldown_until {
            self.cooldown_fails += 1;
            let remaining = self.cooldown_until - now;
            if self.cooldown_fails >= self.fail_limit {
                return Admission::RejectedAndClose {
                    cooldown_ms: remaining,
                };
            }
            return Admission::Rejected {
                cooldown_ms: remaining,
            };
        }

        self.cooldown_until = 0;
        let cooldown = self.cooldown(now, ledger);
        if cooldown > 0 {
            self.cooldown_until = now + cooldown;
            return Admission::Rejected {
                cooldown_ms: cooldown,
            };
        }

        self.cooldown_fails = 0;
        self.bpm_window.push_back(now);
        Admission::Admitted
    }

    /// Answers a cooldown query without arming anything.
    pub fn query_cooldown(&mut self, now: EpochMs, ledger: &BphLedger) -> u64 {
        if self.cooldown_until != 0 && now < self.cooldown_until {
            return self.cooldown_until - now;
        }
        self.cooldown(now, ledger)
    }

    /// Milliseconds until a fresh boop would be admitted; 0 admits.
    fn cooldown(&mut self, now: EpochMs, ledger: &BphLedger) -> u64 {
        // Long window first: the ledger decides when enough entries
        // expire for the hourly sum to drop below the limit.
        if ledger.hourly_total() >= self.bph_limit {
            return self.ledger_cooldown(now, ledger);
        }

        // Short window: prune, then measure against the oldest
        // remaining admission.
        self.prune(now);
        if self.bpm_window.len() >= self.bpm_limit {
            let oldest = self.bpm_window.front().copied().unwrap_or(now);
            return self.bpm_window_ms - now.saturating_sub(oldest);
        }

        0
    }

    /// Walks ledger entries in expiry order, virtually releasing each
    /// until the hourly sum would fall below the limit; the last
    /// released entry's `valid_until` is when a boop next fits.
    fn ledger_cooldown(&self, now: EpochMs, ledger: &BphLedger) -> u64 {
        let mut virtual_sum = ledger.hourly_total();
        let mut soonest = None;

        for entry in ledger.entries_by_expiry() {
            virtual_sum = virtual_sum.saturating_sub(entry.change);
            soonest = Some(entry.valid_until);
            if virtual_sum < self.bph_limit {
                break;
            }
        }

        let soonest = match soonest {
            Some(at) if virtual_sum < self.bph_limit => at,
            // Unsynced admissions alone keep the sum at the limit;
            // nothing expires sooner than a full window.
            _ => now + self.bph_window_ms,
        };

        soonest.saturating_sub(now)
    }

    /// Drops window entries older than the short window.
    fn prune(&mut self, now: EpochMs) {
        while let Some(oldest) = self.bpm_window.front() {
            if now.saturating_sub(*oldest) >= self.bpm_window_ms {
                self.bpm_window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current short-window occupancy, for logs and tests.
    pub fn bpm_window_len(&self) -> usize {
        self.bpm_window.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limiter() -> RateLimiter {
        RateLimiter::new(&AppConfig::default())
    }

    #[test]
    fn admits_below_both_limits() {
        let mut limiter = limiter();
        let ledger = BphLedger::new();
        assert_eq!(limiter.on_boop(1_000, &ledger), Admission::Admitted);
        assert_eq!(limiter.query_cooldown(1_000, &ledger), 0);
    }

    #[test]
    fn bpm_boundary_thousandth_admitted_next_rejected() {
        let mut limiter = limiter();
        let mut ledger = BphLedger::new();
        let start = 1_000_000;

        // 1000 boops inside 50 ms all admit.
        for i in 0..1_000u64 {
            let at = start + (i % 50);
            assert_eq!(limiter.on_boop(at, &ledger), Admission::Admitted, "boop {i}");
            ledger.record_boop();
        }

        // The 1001st at +59_999 is rejected with exactly 1 ms left.
        assert_eq!(
            limiter.on_boop(start + 59_999, &ledger),
            Admission::Rejected { cooldown_ms: 1 }
        );
    }

    #[test]
    fn bpm_window_reopens_at_exactly_one_minute() {
        let mut limiter = limiter();
        let ledger = BphLedger::new();
        let start = 1_000_000;

        for _ in 0..1_000 {
            assert_eq!(limiter.on_boop(start, &ledger), Admission::Admitted);
        }
        // Full window: rejected with the whole minute remaining.
        assert_eq!(
            limiter.on_boop(start + 1, &ledger),
            Admission::Rejected { cooldown_ms: 59_999 }
        );

        // One minute after the oldest admission the window reopens,
        // and the stale cooldown no longer applies.
        assert_eq!(limiter.on_boop(start + 60_000, &ledger), Admission::Admitted);
    }

    #[test]
    fn saturated_ledger_cooldown_is_the_entry_expiry() {
        let mut limiter = limiter();
        let mut ledger = BphLedger::new();
        let now = 1_000_000;

        // One durable entry already worth the whole hourly budget.
        ledger.apply_child_added("k", &json!([now + 1_800_000, 10_000]));

        assert_eq!(
            limiter.on_boop(now, &ledger),
            Admission::Rejected { cooldown_ms: 1_800_000 }
        );
        assert_eq!(limiter.query_cooldown(now, &ledger), 1_800_000);
    }

    #[test]
    fn ledger_walk_releases_just_enough_entries() {
        let mut limiter = limiter();
        let mut ledger = BphLedger::new();
        let now = 1_000_000;

        // 9_000 + 600 + 600 = 10_200 saturates the hourly limit.
        // Releasing the earliest entry already brings the virtual sum
        // to 1_200, so its expiry is the gate.
        ledger.apply_child_added("big", &json!([now + 600_000, 9_000]));
        ledger.apply_child_added("a", &json!([now + 1_200_000, 600]));
        ledger.apply_child_added("b", &json!([now + 1_800_000, 600]));

        assert_eq!(
            limiter.on_boop(now, &ledger),
            Admission::Rejected { cooldown_ms: 600_000 }
        );
    }

    #[test]
    fn unsynced_only_saturation_waits_a_full_window() {
        let mut limiter = limiter();
        let mut ledger = BphLedger::new();
        let now = 1_000_000;

        for _ in 0..10_000 {
            ledger.record_boop();
        }

        assert_eq!(
            limiter.on_boop(now, &ledger),
            Admission::Rejected { cooldown_ms: 3_600_000 }
        );
    }

    #[test]
    fn five_rejections_during_cooldown_close_the_channel() {
        let mut limiter = limiter();
        let mut ledger = BphLedger::new();
        let now = 1_000_000;

        // Arm a cooldown via a saturated ledger.
        ledger.apply_child_added("k", &json!([now + 10_000, 10_000]));
        assert!(matches!(
            limiter.on_boop(now, &ledger),
            Admission::Rejected { .. }
        ));

        // Four more rejections during the active cooldown...
        for i in 0..4 {
            assert!(
                matches!(limiter.on_boop(now + 1 + i, &ledger), Admission::Rejected { .. }),
                "rejection {i} should not close yet"
            );
        }
        // ...and the fifth closes.
        assert!(matches!(
            limiter.on_boop(now + 6, &ledger),
            Admission::RejectedAndClose { .. }
        ));
    }

    #[test]
    fn successful_admission_resets_the_fail_counter() {
        let mut limiter = limiter();
        let mut ledger = BphLedger::new();
        let now = 1_000_000;

        ledger.apply_child_added("k", &json!([now + 5_000, 10_000]));
        assert!(matches!(limiter.on_boop(now, &ledger), Admission::Rejected { .. }));
        for i in 0..3 {
            assert!(matches!(
                limiter.on_boop(now + 1 + i, &ledger),
                Admission::Rejected { .. }
            ));
        }

        // The entry expires and is removed; the next boop admits and
        // clears the counter.
        ledger.apply_child_removed("k");
        assert_eq!(limiter.on_boop(now + 6_000, &ledger), Admission::Admitted);

        // A fresh cooldown starts its abuse count from zero.
        ledger.apply_child_added("k2", &json!([now + 60_000, 10_000]));
        assert!(matches!(
            limiter.on_boop(now + 6_001, &ledger),
            Admission::Rejected { .. }
        ));
        assert!(matches!(
            limiter.on_boop(now + 6_002, &ledger),
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn queries_do_not_advance_the_fail_counter() {
        let mut limiter = limiter();
        let mut ledger = BphLedger::new();
        let now = 1_000_000;

        ledger.apply_child_added("k", &json!([now + 10_000, 10_000]));
        assert!(matches!(limiter.on_boop(now, &ledger), Admission::Rejected { .. }));

        for _ in 0..20 {
            assert!(limiter.query_cooldown(now + 1, &ledger) > 0);
        }
        // Still only the first in-cooldown rejection counted.
        assert!(matches!(
            limiter.on_boop(now + 2, &ledger),
            Admission::Rejected { .. }
        ));
    }
}
