//! Core shared types for the boopd realtime counter system.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;
pub mod entry;
pub mod time;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use entry::BphEntry;
pub use time::EpochMs;

// ---------------------------------------------------------------------------
// ClientId
// ---------------------------------------------------------------------------

/// Opaque client identifier derived from a caller-supplied network
/// identifier (typically the remote address handed over by the
/// transport layer).
///
/// The raw identifier is escaped so the result is always safe to use
/// as a single store key segment: it never contains `/`, `.`, `#`,
/// `$`, `[`, or `]`. Bytes outside `[A-Za-z0-9_-]` are written as
/// `~xx` (two lowercase hex digits); `~` itself is escaped the same
/// way so the mapping is unambiguous.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Derives a key-safe client id from a raw network identifier.
    ///
    /// One session per identifier; the server does not authenticate
    /// clients beyond this mapping.
    pub fn from_remote(identifier: &str) -> Self {
        let mut out = String::with_capacity(identifier.len());
        for b in identifier.bytes() {
            match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => {
                    out.push(b as char);
                }
                other => {
                    out.push('~');
                    out.push_str(&format!("{other:02x}"));
                }
            }
        }
        Self(out)
    }

    /// Returns the escaped identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CloseCode
// ---------------------------------------------------------------------------

/// Close codes the session emits when it terminates the channel.
///
/// Clients reconnect with backoff on [`Internal`](Self::Internal) and
/// [`HeartbeatTimeout`](Self::HeartbeatTimeout); they stay down on
/// [`CooldownAbuse`](Self::CooldownAbuse).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CloseCode {
    /// Initialization failed (store signin, subscriptions, initial reads).
    Internal,
    /// No heartbeat received within the timeout period.
    HeartbeatTimeout,
    /// Too many boop requests during an active cooldown.
    CooldownAbuse,
}

impl CloseCode {
    /// The numeric code carried on the wire-level close frame.
    pub fn code(&self) -> u16 {
        match self {
            Self::Internal => 1000,
            Self::HeartbeatTimeout => 1001,
            Self::CooldownAbuse => 1002,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::HeartbeatTimeout => write!(f, "heartbeat_timeout"),
            Self::CooldownAbuse => write!(f, "cooldown_abuse"),
        }
    }
}

// ---------------------------------------------------------------------------
// BoopdError
// ---------------------------------------------------------------------------

/// Central error type for the boopd system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum BoopdError {
    /// A store read, write, or subscription failed.
    #[error("store error: {reason}")]
    StoreError {
        /// Human-readable description of the store failure.
        reason: String,
    },

    /// A wire frame or store datum violates the protocol.
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// Token minting or store signin failed.
    #[error("credential error: {reason}")]
    CredentialError {
        /// Human-readable description of the credential failure.
        reason: String,
    },

    /// The transport channel is gone.
    #[error("channel error: {reason}")]
    ChannelError {
        /// Human-readable description of the channel failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`BoopdError`].
pub type Result<T> = std::result::Result<T, BoopdError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
