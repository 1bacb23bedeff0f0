//! Per-connection session: initialization, the event loop, frame
//! dispatch, and the shutdown flush.
//!
//! A session is **single-threaded cooperative**: every piece of
//! mutable state lives inside one `tokio::select!` loop, so message
//! handling, timer ticks, store callbacks, and write completions are
//! serialized without locks. Store writes are spawned and their
//! outcomes fan back into the loop over an internal channel; the
//! handlers re-check state on completion instead of holding it across
//! the await.
//!
//! # Lifecycle
//!
//! ```text
//! signin ──▶ subscribe ──▶ ensure/read ──▶ accept ──▶ event loop ──▶ flush ──▶ release
//!    │            │             │   (any failure: close 1000)
//!    └────────────┴─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use boopd_protocol::{ClientFrame, ServerFrame};
use boopd_store::auth::{CredentialBroker, StoreSession};
use boopd_store::{path, ChildEvent, ChildStream, Store, ValueStream};
use boopd_types::config::AppConfig;
use boopd_types::time::{now_ms, EpochMs};
use boopd_types::{BphEntry, ClientId, CloseCode, Result};

use crate::channel::{ChannelCommand, ChannelEvent, ClientChannel};
use crate::gbc::GbcScheduler;
use crate::ledger::{ApplyOutcome, BphLedger};
use crate::limiter::{Admission, RateLimiter};
use crate::watchdog::Watchdog;

/// Convenience alias.
type BResult<T> = Result<T>;

// ---------------------------------------------------------------------------
// SessionReport
// ---------------------------------------------------------------------------

/// What happened to a session, returned when it winds down.
#[derive(Clone, Copy, Debug)]
pub struct SessionReport {
    /// Close code the session initiated, or `None` when the peer (or
    /// transport) closed the channel.
    pub close: Option<CloseCode>,
    /// Counter delta written by the shutdown flush.
    pub flushed_gbc: u64,
    /// Ledger delta appended by the shutdown flush.
    pub flushed_bph: u64,
}

// ---------------------------------------------------------------------------
// Internal write outcomes
// ---------------------------------------------------------------------------

/// Completion of a spawned store write, delivered back into the loop.
enum WriteOutcome {
    GbcAdd {
        change: u64,
        result: BResult<i64>,
    },
    BphAppend {
        change: u64,
        result: BResult<String>,
    },
    EntryRemove {
        key: String,
        result: BResult<()>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Runs one client session to completion.
///
/// The channel must already be established; `client_id` is the stable
/// identifier the transport derived for the peer. Returns the
/// [`SessionReport`] on any orderly end (including abuse and
/// heartbeat closes).
///
/// # Errors
///
/// Only initialization failures (signin, subscriptions, initial
/// reads) surface as `Err`; the channel is closed with code 1000
/// first. Transient store failures during the session are logged and
/// absorbed.
pub async fn run_session(
    client_id: ClientId,
    channel: ClientChannel,
    broker: &CredentialBroker,
    config: AppConfig,
) -> BResult<SessionReport> {
    let outbound = channel.outbound.clone();

    let parts = match initialize(&client_id, broker, &config).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(%client_id, error = %e, "session initialization failed");
            let _ = outbound.send(ChannelCommand::Close {
                code: CloseCode::Internal,
                reason: "Internal Server Error".into(),
            });
            return Err(e);
        }
    };

    let InitParts {
        store_session,
        bph_events,
        gbc_values,
        ledger,
        gbc,
        malformed_seed_keys,
    } = parts;

    let (writes_tx, writes_rx) = mpsc::unbounded_channel();
    let mut session = Session {
        client_id,
        store: store_session.store().clone(),
        outbound,
        limiter: RateLimiter::new(&config),
        ledger,
        gbc,
        watchdog: Watchdog::new(config.heartbeat_timeout_ms),
        writes_tx,
        config,
    };

    // Malformed data found in the initial snapshot is scheduled for
    // removal, same as when it arrives via the subscription.
    for key in malformed_seed_keys {
        tracing::warn!(client_id = %session.client_id, key, "malformed ledger entry in snapshot; removing");
        session.issue_entry_remove(key);
    }

    tracing::info!(
        client_id = %session.client_id,
        count = session.gbc.last_gbc(),
        ledger_entries = session.ledger.len(),
        "session accepted"
    );
    session.send_frame(ServerFrame::Count {
        count: session.gbc.last_gbc(),
    });

    let close = drive(&mut session, channel.inbound, bph_events, gbc_values, writes_rx).await;
    // `drive` consumed and dropped the subscriptions, timers, and the
    // outcome channel; only the flush and the release remain.

    let flush = tokio::time::timeout(
        Duration::from_millis(session.config.shutdown_flush_ms),
        session.final_flush(),
    )
    .await;
    let (flushed_gbc, flushed_bph) = match flush {
        Ok(deltas) => deltas,
        Err(_) => {
            tracing::warn!(
                client_id = %session.client_id,
                "shutdown flush ran out of its extension window"
            );
            (0, 0)
        }
    };

    store_session.release();

    tracing::info!(
        client_id = %session.client_id,
        close = close.map(|c| c.code()),
        flushed_gbc,
        flushed_bph,
        "session ended"
    );

    Ok(SessionReport {
        close,
        flushed_gbc,
        flushed_bph,
    })
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

struct InitParts {
    store_session: StoreSession,
    bph_events: ChildStream,
    gbc_values: ValueStream,
    ledger: BphLedger,
    gbc: GbcScheduler,
    malformed_seed_keys: Vec<String>,
}

/// Signin, subscriptions, subtree repair, and the initial reads.
async fn initialize(
    client_id: &ClientId,
    broker: &CredentialBroker,
    config: &AppConfig,
) -> BResult<InitParts> {
    config.validate()?;

    let store_session = broker.open_session(&config.service_uid).await?;
    let store = store_session.store().clone();

    // Subscribe before the initial reads so no change can fall into
    // the gap; a double delivery re-balances the mirror harmlessly.
    let bph_path = path::bph_client(client_id);
    let bph_events = store.subscribe_children(&bph_path)?;
    let gbc_values = store.subscribe_value(&path::gbc())?;

    let ((ledger, malformed_seed_keys), initial_count) = tokio::try_join!(
        init_ledger(&store, &bph_path),
        init_counter(&store),
    )?;

    let mut gbc = GbcScheduler::new(config.gbc_sync_interval_ms);
    gbc.seed(initial_count, now_ms());

    Ok(InitParts {
        store_session,
        bph_events,
        gbc_values,
        ledger,
        gbc,
        malformed_seed_keys,
    })
}

/// Repairs the ledger subtrees if needed and seeds the mirror.
async fn init_ledger(
    store: &Arc<dyn Store>,
    bph_path: &path::StorePath,
) -> BResult<(BphLedger, Vec<String>)> {
    // A non-map root would poison every client's sweep; reset it.
    match store.get(&path::bph_root()).await? {
        Some(Value::Object(_)) => {}
        other => {
            tracing::warn!(?other, "bph root is not a map; resetting");
            store.set(&path::bph_root(), json!({})).await?;
        }
    }

    let mut ledger = BphLedger::new();
    let mut malformed = Vec::new();

    match store.get(bph_path).await? {
        Some(Value::Object(entries)) => {
            for (key, value) in &entries {
                if ledger.apply_child_added(key, value) == ApplyOutcome::Malformed {
                    malformed.push(key.clone());
                }
            }
        }
        other => {
            if other.is_some() {
                tracing::warn!(path = %bph_path, "client ledger is not a map; resetting");
            }
            store.set(bph_path, json!({})).await?;
        }
    }

    Ok((ledger, malformed))
}

/// Reads the initial counter value; absent or non-numeric reads as 0.
async fn init_counter(store: &Arc<dyn Store>) -> BResult<u64> {
    match store.get(&path::gbc()).await? {
        None | Some(Value::Null) => Ok(0),
        Some(value) => match value.as_u64() {
            Some(count) => Ok(count),
            None => {
                tracing::warn!(%value, "stored counter is not a non-negative integer; starting from 0");
                Ok(0)
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Multiplexes the channel, timers, subscriptions, and write
/// completions until the session ends. Returns the close code the
/// session initiated, or `None` when the peer closed.
async fn drive(
    session: &mut Session,
    mut inbound: mpsc::Receiver<ChannelEvent>,
    mut bph_events: ChildStream,
    mut gbc_values: ValueStream,
    mut writes_rx: mpsc::UnboundedReceiver<WriteOutcome>,
) -> Option<CloseCode> {
    let gbc_period = Duration::from_millis(session.config.gbc_sync_interval_ms);
    let mut gbc_tick = tokio::time::interval_at(Instant::now() + gbc_period, gbc_period);
    gbc_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let bph_period = Duration::from_millis(session.config.bph_sync_interval_ms);
    let mut bph_tick = tokio::time::interval_at(Instant::now() + bph_period, bph_period);
    bph_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // One rearmed sleep covers all per-entry expiries.
        let next_expiry = session.ledger.next_expiry();
        let expiry_in = next_expiry
            .map(|at| at.saturating_sub(now_ms()))
            .unwrap_or(0);

        tokio::select! {
            maybe_event = inbound.recv() => match maybe_event {
                None | Some(ChannelEvent::Closed) => {
                    tracing::debug!(client_id = %session.client_id, "channel closed by peer");
                    return None;
                }
                Some(ChannelEvent::Text(text)) => {
                    if let Some(code) = session.handle_text(&text) {
                        return Some(code);
                    }
                }
                Some(ChannelEvent::Binary(bytes)) => {
                    tracing::warn!(
                        client_id = %session.client_id,
                        len = bytes.len(),
                        "ignoring binary frame on a text protocol"
                    );
                }
            },

            _ = tokio::time::sleep_until(session.watchdog.deadline()) => {
                session.close_channel(
                    CloseCode::HeartbeatTimeout,
                    "No heartbeat received within the timeout period",
                );
                return Some(CloseCode::HeartbeatTimeout);
            }

            _ = gbc_tick.tick() => session.try_gbc_sync(now_ms()),

            _ = bph_tick.tick() => session.try_bph_sync(now_ms()),

            _ = tokio::time::sleep(Duration::from_millis(expiry_in)), if next_expiry.is_some() => {
                session.expire_due(now_ms());
            }

            Some(event) = bph_events.recv() => session.handle_child_event(event),

            Some(value) = gbc_values.recv() => session.handle_counter_value(value),

            Some(outcome) = writes_rx.recv() => session.handle_write_outcome(outcome),
        }
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// All mutable per-connection state; touched only by the event loop.
struct Session {
    client_id: ClientId,
    config: AppConfig,
    store: Arc<dyn Store>,
    outbound: mpsc::UnboundedSender<ChannelCommand>,
    limiter: RateLimiter,
    ledger: BphLedger,
    gbc: GbcScheduler,
    watchdog: Watchdog,
    writes_tx: mpsc::UnboundedSender<WriteOutcome>,
}

impl Session {
    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Fire-and-forget frame send; a dead transport surfaces as the
    /// channel-closed event, not here.
    fn send_frame(&self, frame: ServerFrame) {
        let _ = self.outbound.send(ChannelCommand::Send(frame.encode()));
    }

    fn close_channel(&self, code: CloseCode, reason: &str) {
        tracing::info!(client_id = %self.client_id, code = code.code(), reason, "closing channel");
        let _ = self.outbound.send(ChannelCommand::Close {
            code,
            reason: reason.into(),
        });
    }

    // -----------------------------------------------------------------------
    // Frame dispatch
    // -----------------------------------------------------------------------

    /// Handles one text frame; a `Some` return ends the session with
    /// that close code.
    fn handle_text(&mut self, text: &str) -> Option<CloseCode> {
        let frame = match ClientFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "invalid frame");
                self.send_frame(ServerFrame::Invalid);
                return None;
            }
        };

        match frame {
            ClientFrame::Heartbeat => {
                self.watchdog.rearm();
                self.send_frame(ServerFrame::Heartbeat);
                None
            }
            ClientFrame::Boop { boop_id } => self.handle_boop(boop_id, now_ms()),
            ClientFrame::CooldownQuery { query_id } => {
                let cooldown_ms = self.limiter.query_cooldown(now_ms(), &self.ledger);
                self.send_frame(ServerFrame::CooldownReply {
                    query_id,
                    cooldown_ms,
                });
                None
            }
        }
    }

    fn handle_boop(&mut self, boop_id: u64, now: EpochMs) -> Option<CloseCode> {
        match self.limiter.on_boop(now, &self.ledger) {
            Admission::Admitted => {
                self.ledger.record_boop();
                self.gbc.record_boop();
                self.try_gbc_sync(now);
                self.send_frame(ServerFrame::BoopAccepted { boop_id });
                self.send_frame(ServerFrame::Count {
                    count: self.gbc.displayed(),
                });
                None
            }
            Admission::Rejected { cooldown_ms } => {
                self.send_frame(ServerFrame::BoopRejected {
                    boop_id,
                    cooldown_ms,
                });
                None
            }
            Admission::RejectedAndClose { cooldown_ms } => {
                self.send_frame(ServerFrame::BoopRejected {
                    boop_id,
                    cooldown_ms,
                });
                self.close_channel(
                    CloseCode::CooldownAbuse,
                    "too many boop requests during an active cooldown",
                );
                Some(CloseCode::CooldownAbuse)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Store events
    // -----------------------------------------------------------------------

    fn handle_child_event(&mut self, event: ChildEvent) {
        match event {
            ChildEvent::Added { key, value } => {
                match self.ledger.apply_child_added(&key, &value) {
                    ApplyOutcome::Malformed => {
                        tracing::warn!(
                            client_id = %self.client_id,
                            key,
                            %value,
                            "malformed ledger entry from store; removing"
                        );
                        self.issue_entry_remove(key);
                    }
                    outcome => {
                        tracing::debug!(
                            client_id = %self.client_id,
                            key,
                            ?outcome,
                            sum = self.ledger.last_sum(),
                            "ledger entry mirrored"
                        );
                    }
                }
            }
            ChildEvent::Removed { key } => {
                if !self.ledger.apply_child_removed(&key) {
                    tracing::warn!(
                        client_id = %self.client_id,
                        key,
                        "removal echo for unknown ledger entry"
                    );
                }
            }
        }
    }

    fn handle_counter_value(&mut self, value: Value) {
        let Some(count) = value.as_u64() else {
            tracing::warn!(client_id = %self.client_id, %value, "non-numeric counter update ignored");
            return;
        };

        if self.gbc.observe_remote(count) {
            self.send_frame(ServerFrame::Count {
                count: self.gbc.displayed(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Spawned writes
    // -----------------------------------------------------------------------

    fn try_gbc_sync(&mut self, now: EpochMs) {
        let Some(change) = self.gbc.begin_sync(now, false) else {
            return;
        };

        let store = self.store.clone();
        let writes = self.writes_tx.clone();
        tokio::spawn(async move {
            let result = store.atomic_add(&path::gbc(), change as i64).await;
            let _ = writes.send(WriteOutcome::GbcAdd { change, result });
        });
    }

    fn try_bph_sync(&mut self, now: EpochMs) {
        let Some(change) = self.ledger.begin_sync() else {
            return;
        };

        let entry = BphEntry::new(now + self.config.bph_window_ms, change);
        let store = self.store.clone();
        let bph_path = path::bph_client(&self.client_id);
        let writes = self.writes_tx.clone();
        tokio::spawn(async move {
            let result = store.push(&bph_path, entry.to_value()).await;
            let _ = writes.send(WriteOutcome::BphAppend { change, result });
        });
    }

    fn expire_due(&mut self, now: EpochMs) {
        for key in self.ledger.take_due(now) {
            tracing::debug!(client_id = %self.client_id, key, "ledger entry expired; removing");
            self.issue_entry_remove(key);
        }
    }

    fn issue_entry_remove(&mut self, key: String) {
        let store = self.store.clone();
        let entry_path = path::bph_entry(&self.client_id, &key);
        let writes = self.writes_tx.clone();
        tokio::spawn(async move {
            let result = store.remove(&entry_path).await;
            let _ = writes.send(WriteOutcome::EntryRemove { key, result });
        });
    }

    fn handle_write_outcome(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::GbcAdd { change, result } => {
                let ok = match result {
                    Ok(total) => {
                        tracing::debug!(change, total, "counter write applied");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, change, "counter write failed; restoring");
                        false
                    }
                };
                if self.gbc.complete_sync(change, ok) {
                    // A request landed while the write was in flight.
                    tracing::debug!(client_id = %self.client_id, "re-entering coalesced counter sync");
                    self.try_gbc_sync(now_ms());
                }
            }
            WriteOutcome::BphAppend { change, result } => match result {
                Ok(key) => {
                    tracing::debug!(change, key, "ledger entry appended");
                }
                Err(e) => {
                    tracing::warn!(error = %e, change, "ledger append failed; restoring");
                    self.ledger.fail_sync(change);
                }
            },
            WriteOutcome::EntryRemove { key, result } => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, key, "ledger entry removal failed");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown flush
    // -----------------------------------------------------------------------

    /// Best-effort flush of both unsynced tallies, in parallel.
    async fn final_flush(&mut self) -> (u64, u64) {
        let now = now_ms();
        let gbc_change = self.gbc.begin_sync(now, true);
        let bph_change = self.ledger.begin_sync();

        let counter_flush = async {
            let Some(change) = gbc_change else { return 0 };
            match self.store.atomic_add(&path::gbc(), change as i64).await {
                Ok(total) => {
                    tracing::debug!(change, total, "final counter flush applied");
                    change
                }
                Err(e) => {
                    tracing::warn!(error = %e, change, "final counter flush failed");
                    0
                }
            }
        };

        let ledger_flush = async {
            let Some(change) = bph_change else { return 0 };
            let entry = BphEntry::new(now + self.config.bph_window_ms, change);
            let bph_path = path::bph_client(&self.client_id);
            match self.store.push(&bph_path, entry.to_value()).await {
                Ok(key) => {
                    tracing::debug!(change, key, "final ledger flush applied");
                    change
                }
                Err(e) => {
                    tracing::warn!(error = %e, change, "final ledger flush failed");
                    0
                }
            }
        };

        tokio::join!(counter_flush, ledger_flush)
    }
}
