//! Periodic sweep of stale ledger entries across all clients.
//!
//! Sessions remove their own entries as they expire, but entries
//! survive when a session dies mid-flush or a client never returns.
//! The janitor walks the whole `bph` subtree under its own store
//! session and removes anything whose `valid_until` — plus an extra
//! hour of grace, so it never races an owning session that is still
//! flushing — has passed. Malformed data is removed on sight.
//!
//! Driven by a cron-style trigger with retries disabled: one
//! invocation, one sweep, errors per key logged and swallowed.

use futures::future::join_all;
use serde_json::{json, Value};

use boopd_store::auth::CredentialBroker;
use boopd_store::{path, Store, StorePath};
use boopd_types::config::AppConfig;
use boopd_types::time::{now_ms, EpochMs};
use boopd_types::{BphEntry, Result};

/// Convenience alias.
type BResult<T> = Result<T>;

// ---------------------------------------------------------------------------
// JanitorReport
// ---------------------------------------------------------------------------

/// Summary of one sweep.
#[derive(Clone, Copy, Debug, Default)]
pub struct JanitorReport {
    /// Client subtrees visited.
    pub clients_scanned: usize,
    /// Ledger entries examined.
    pub entries_scanned: usize,
    /// Removals issued (stale entries, malformed entries, and
    /// non-map subtrees alike).
    pub removals_issued: usize,
    /// Removals that failed; the next sweep retries them.
    pub removals_failed: usize,
    /// The `bph` root was not a map and was reset to empty.
    pub reset_root: bool,
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Sweeps every client's ledger subtree once.
///
/// Removal targets are collected in one pass and issued in parallel;
/// per-key failures are logged and counted, never propagated.
///
/// # Errors
///
/// Only the initial root read (and the root reset) can fail the
/// sweep as a whole.
pub async fn sweep_stale_entries(
    store: &dyn Store,
    now: EpochMs,
    grace_ms: u64,
) -> BResult<JanitorReport> {
    let mut report = JanitorReport::default();

    let clients = match store.get(&path::bph_root()).await? {
        Some(Value::Object(clients)) => clients,
        other => {
            tracing::warn!(?other, "bph root is not a map; resetting");
            store.set(&path::bph_root(), json!({})).await?;
            report.reset_root = true;
            return Ok(report);
        }
    };

    let mut targets: Vec<StorePath> = Vec::new();

    for (client_key, entries) in &clients {
        report.clients_scanned += 1;
        let client_path = path::bph_root().child(client_key);

        let Some(entries) = entries.as_object() else {
            tracing::warn!(client = client_key, "ledger subtree is not a map; removing");
            targets.push(client_path);
            continue;
        };

        for (entry_key, value) in entries {
            report.entries_scanned += 1;
            match BphEntry::from_value(value) {
                Err(e) => {
                    tracing::warn!(
                        client = client_key,
                        key = entry_key,
                        error = %e,
                        "malformed ledger entry; removing"
                    );
                    targets.push(client_path.child(entry_key));
                }
                Ok(entry) if entry.sweepable(now, grace_ms) => {
                    targets.push(client_path.child(entry_key));
                }
                Ok(_) => {}
            }
        }
    }

    report.removals_issued = targets.len();

    let results = join_all(targets.iter().map(|target| store.remove(target))).await;
    for (target, result) in targets.iter().zip(results) {
        if let Err(e) = result {
            tracing::warn!(path = %target, error = %e, "sweep removal failed");
            report.removals_failed += 1;
        }
    }

    tracing::info!(
        clients = report.clients_scanned,
        entries = report.entries_scanned,
        removed = report.removals_issued - report.removals_failed,
        failed = report.removals_failed,
        "janitor sweep complete"
    );

    Ok(report)
}

// ---------------------------------------------------------------------------
// Janitor
// ---------------------------------------------------------------------------

/// The scheduled janitor: opens its own store session per run.
pub struct Janitor<'a> {
    broker: &'a CredentialBroker,
    config: AppConfig,
}

impl<'a> Janitor<'a> {
    /// Creates a janitor over the shared credential broker.
    pub fn new(broker: &'a CredentialBroker, config: AppConfig) -> Self {
        Self { broker, config }
    }

    /// Runs one sweep, releasing the store session whatever happens.
    pub async fn run_once(&self) -> BResult<JanitorReport> {
        let session = self.broker.open_session(&self.config.service_uid).await?;
        let result = sweep_stale_entries(
            session.store().as_ref(),
            now_ms(),
            self.config.janitor_grace_ms,
        )
        .await;
        session.release();
        result
    }
}
