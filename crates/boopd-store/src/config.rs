//! Store and credential configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use boopd_types::{BoopdError, Result};

/// Configuration for the store adapter and the credential
/// collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Opaque configuration blob handed to the store adapter
    /// (endpoints, database name, adapter-specific options). The core
    /// never interprets it.
    pub store_blob: Value,

    /// Token-service endpoint passed to the credential collaborator.
    pub token_endpoint: String,

    /// Key-value namespace the collaborator may use for a durable
    /// token cache tier.
    pub cache_namespace: String,

    /// Prefix for token cache keys; cache entries are keyed
    /// `(prefix, uid)`.
    pub token_prefix: String,

    /// Token lifetime in milliseconds.
    pub token_ttl_ms: u64,

    /// Cached tokens with less remaining life than this are
    /// re-minted.
    pub token_min_remaining_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_blob: Value::Null,
            token_endpoint: "http://localhost:8791/token".into(),
            cache_namespace: "boopd-tokens".into(),
            token_prefix: "fbtok".into(),
            token_ttl_ms: 3_600_000,
            token_min_remaining_ms: 10_000,
        }
    }
}

impl StoreConfig {
    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.token_endpoint.is_empty() {
            return Err(BoopdError::ConfigError {
                reason: "token_endpoint must not be empty".into(),
            });
        }
        if self.token_prefix.is_empty() {
            return Err(BoopdError::ConfigError {
                reason: "token_prefix must not be empty".into(),
            });
        }
        if self.token_ttl_ms == 0 {
            return Err(BoopdError::ConfigError {
                reason: "token_ttl_ms must be greater than 0".into(),
            });
        }
        if self.token_min_remaining_ms >= self.token_ttl_ms {
            return Err(BoopdError::ConfigError {
                reason: "token_min_remaining_ms must be below token_ttl_ms".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn default_token_lifetimes() {
        let config = StoreConfig::default();
        assert_eq!(config.token_ttl_ms, 3_600_000);
        assert_eq!(config.token_min_remaining_ms, 10_000);
    }

    #[test]
    fn empty_endpoint_rejected() {
        let config = StoreConfig {
            token_endpoint: String::new(),
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn remaining_floor_above_ttl_rejected() {
        let config = StoreConfig {
            token_ttl_ms: 5_000,
            token_min_remaining_ms: 5_000,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
