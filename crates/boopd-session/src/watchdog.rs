//! Heartbeat watchdog.
//!
//! Armed when the channel is accepted; every inbound heartbeat rearms
//! it. The session's event loop sleeps on [`deadline`](Watchdog::deadline)
//! and closes the channel with code 1001 when it fires. Deadlines are
//! monotonic (`tokio::time::Instant`) so a wall-clock step cannot kill
//! healthy connections.

use std::time::Duration;

use tokio::time::Instant;

/// Deadline tracker for inbound heartbeats.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Instant,
}

impl Watchdog {
    /// Arms the watchdog `timeout_ms` from now.
    pub fn new(timeout_ms: u64) -> Self {
        let timeout = Duration::from_millis(timeout_ms);
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Pushes the deadline a full timeout into the future.
    pub fn rearm(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    /// The instant at which the session must close with 1001.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
