//! boopd session runtime.
//!
//! The core of the realtime counter: a long-lived, stateful handler
//! per connected client, plus the cross-client janitor. Each session
//! speaks the framed text protocol over an established channel,
//! enforces the two-window rate limit whose hourly half lives in the
//! durable store, coalesces counter writes, reacts to external store
//! mutations, and flushes on shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  Session                      │
//! │  channel ──▶ codec ──▶ dispatch               │
//! │                          │                    │
//! │      ┌───────────────────┼────────────┐       │
//! │      ▼                   ▼            ▼       │
//! │  RateLimiter ◀── BphLedger      GbcScheduler  │
//! │      │               │                │       │
//! │      │         ┌─────┴────────────────┴───┐   │
//! │      │         │    spawned store writes  │   │
//! │      │         └─────┬────────────────────┘   │
//! │  Watchdog            ▼                        │
//! │   (1001)        store adapter ◀── store echo  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Everything mutable is confined to one `tokio::select!` loop per
//! session; sessions share nothing but the store.
//!
//! # Modules
//!
//! - [`channel`] — transport-neutral channel events and commands.
//! - [`limiter`] — BPM window + BPH ledger admission control.
//! - [`ledger`] — mirror of the client's durable hourly ledger.
//! - [`gbc`] — single-flight coalesced global-counter writes.
//! - [`watchdog`] — heartbeat deadline.
//! - [`session`] — initialization, the event loop, shutdown flush.
//! - [`janitor`] — scheduled sweep of stale ledger entries.

pub mod channel;
pub mod gbc;
pub mod janitor;
pub mod ledger;
pub mod limiter;
pub mod session;
pub mod watchdog;

// Re-exports for hosts and tests.
pub use channel::{ChannelCommand, ChannelEvent, ClientChannel, TransportEnd};
pub use janitor::{Janitor, JanitorReport};
pub use session::{run_session, SessionReport};
