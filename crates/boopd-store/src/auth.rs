//! Credential collaborator: token minting, the TTL token cache, and
//! store signin.
//!
//! The core consumes exactly one capability from this module:
//! `open_session(uid) → StoreSession`. Token minting is an external
//! RPC behind [`TokenService`]; signin is the database's own
//! handshake behind [`StoreConnector`]. The broker in between caches
//! minted tokens keyed by `(prefix, uid)` and re-mints when a cached
//! token's remaining life drops under the configured floor.
//!
//! Durable cache tiers (key-value namespaces shared across hosts) are
//! an implementation choice of the collaborator, not of this core;
//! the broker here carries the fast in-memory tier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use boopd_types::time::{now_ms, EpochMs};
use boopd_types::{BoopdError, Result};

use crate::adapter::Store;
use crate::config::StoreConfig;

/// Convenience alias.
type BResult<T> = Result<T>;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// External token-minting RPC.
#[async_trait]
pub trait TokenService: Send + Sync {
    /// Mints a fresh signin token for `uid`.
    async fn generate_token(&self, uid: &str) -> BResult<String>;
}

/// Database-side signin handshake.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Exchanges a token for an authenticated store session.
    async fn signin(&self, token: &str) -> BResult<StoreSession>;
}

// ---------------------------------------------------------------------------
// StoreSession
// ---------------------------------------------------------------------------

/// An authenticated handle to the store.
///
/// Sessions are released by dropping them (or explicitly via
/// [`release`](Self::release)); the shutdown sequence keeps the
/// session alive until the final flush has run.
pub struct StoreSession {
    store: Arc<dyn Store>,
}

impl StoreSession {
    /// Wraps an authenticated store handle.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The store capability this session grants.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Releases the session.
    pub fn release(self) {
        drop(self);
    }
}

// ---------------------------------------------------------------------------
// CredentialBroker
// ---------------------------------------------------------------------------

/// Cached token plus its mint time.
struct CachedToken {
    token: String,
    minted_at: EpochMs,
}

/// Mints, caches, and exchanges tokens for store sessions.
pub struct CredentialBroker {
    tokens: Arc<dyn TokenService>,
    connector: Arc<dyn StoreConnector>,
    prefix: String,
    ttl_ms: u64,
    min_remaining_ms: u64,
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl CredentialBroker {
    /// Creates a broker from the store configuration and the two
    /// collaborator capabilities.
    pub fn new(
        config: &StoreConfig,
        tokens: Arc<dyn TokenService>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        Self {
            tokens,
            connector,
            prefix: config.token_prefix.clone(),
            ttl_ms: config.token_ttl_ms,
            min_remaining_ms: config.token_min_remaining_ms,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Opens an authenticated store session for `uid`.
    ///
    /// # Errors
    ///
    /// [`BoopdError::CredentialError`] when minting or signin fails;
    /// callers treat this as an initialization failure.
    pub async fn open_session(&self, uid: &str) -> BResult<StoreSession> {
        let token = self.token_for(uid, now_ms()).await?;
        self.connector.signin(&token).await
    }

    /// Returns a token for `uid`, minting unless a cached one still
    /// has at least the configured remaining life.
    async fn token_for(&self, uid: &str, now: EpochMs) -> BResult<String> {
        let key = format!("{}:{uid}", self.prefix);

        if let Some(token) = self.cached_token(&key, now)? {
            return Ok(token);
        }

        let token = self.tokens.generate_token(uid).await?;
        tracing::debug!(uid, "minted store token");

        let mut cache = self.lock_cache()?;
        cache.insert(
            key,
            CachedToken {
                token: token.clone(),
                minted_at: now,
            },
        );
        Ok(token)
    }

    fn cached_token(&self, key: &str, now: EpochMs) -> BResult<Option<String>> {
        let cache = self.lock_cache()?;
        let Some(cached) = cache.get(key) else {
            return Ok(None);
        };

        let expires_at = cached.minted_at.saturating_add(self.ttl_ms);
        let remaining = expires_at.saturating_sub(now);
        if remaining < self.min_remaining_ms {
            return Ok(None);
        }

        Ok(Some(cached.token.clone()))
    }

    fn lock_cache(&self) -> BResult<std::sync::MutexGuard<'_, HashMap<String, CachedToken>>> {
        self.cache.lock().map_err(|_| BoopdError::CredentialError {
            reason: "token cache lock poisoned".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
