//! Session and janitor configuration with sensible defaults.
//!
//! All operational parameters are centralized here. Every value has a
//! documented default matching the production deployment.

use serde::{Deserialize, Serialize};

use crate::{BoopdError, Result};

/// Core configuration shared by sessions and the janitor.
///
/// All values are configurable via settings file or the hosting
/// runtime; defaults match the production counter service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Maximum admitted boops inside one short window.
    pub bpm_limit: u32,

    /// Length of the short rate window in milliseconds.
    pub bpm_window_ms: u64,

    /// Maximum admitted boops inside one long window.
    pub bph_limit: u64,

    /// Length of the long rate window in milliseconds. Also the
    /// lifetime of a ledger entry from the moment it is appended.
    pub bph_window_ms: u64,

    /// Consecutive rejected boops during an active cooldown before
    /// the channel is closed for abuse.
    pub cooldown_fail_limit: u32,

    /// Inbound heartbeat deadline in milliseconds.
    pub heartbeat_timeout_ms: u64,

    /// Minimum spacing between coalesced global-counter writes.
    pub gbc_sync_interval_ms: u64,

    /// Spacing between ledger append cycles.
    pub bph_sync_interval_ms: u64,

    /// Upper bound on the shutdown flush, mirroring the extension
    /// window the hosting runtime grants on channel close.
    pub shutdown_flush_ms: u64,

    /// Extra grace the janitor waits past `valid_until` before
    /// sweeping an entry, so it never races an owning session that is
    /// still flushing.
    pub janitor_grace_ms: u64,

    /// Store identity the server signs in as (token subject).
    pub service_uid: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bpm_limit: 1_000,
            bpm_window_ms: 60_000,
            bph_limit: 10_000,
            bph_window_ms: 3_600_000,
            cooldown_fail_limit: 5,
            heartbeat_timeout_ms: 30_000,
            gbc_sync_interval_ms: 250,
            bph_sync_interval_ms: 60_000,
            shutdown_flush_ms: 60_000,
            janitor_grace_ms: 3_600_000,
            service_uid: "counter-backend".into(),
        }
    }
}

impl AppConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        fn nonzero(value: u64, name: &str) -> Result<()> {
            if value == 0 {
                return Err(BoopdError::ConfigError {
                    reason: format!("{name} must be greater than 0"),
                });
            }
            Ok(())
        }

        nonzero(self.bpm_limit as u64, "bpm_limit")?;
        nonzero(self.bpm_window_ms, "bpm_window_ms")?;
        nonzero(self.bph_limit, "bph_limit")?;
        nonzero(self.bph_window_ms, "bph_window_ms")?;
        nonzero(self.cooldown_fail_limit as u64, "cooldown_fail_limit")?;
        nonzero(self.heartbeat_timeout_ms, "heartbeat_timeout_ms")?;
        nonzero(self.gbc_sync_interval_ms, "gbc_sync_interval_ms")?;
        nonzero(self.bph_sync_interval_ms, "bph_sync_interval_ms")?;
        nonzero(self.shutdown_flush_ms, "shutdown_flush_ms")?;

        if self.service_uid.is_empty() {
            return Err(BoopdError::ConfigError {
                reason: "service_uid must not be empty".into(),
            });
        }

        Ok(())
    }
}
