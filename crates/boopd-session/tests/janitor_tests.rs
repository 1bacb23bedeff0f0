//! Janitor sweep behavior against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use boopd_session::janitor::{sweep_stale_entries, Janitor};
use boopd_store::auth::{CredentialBroker, TokenService};
use boopd_store::{path, MemoryConnector, MemoryStore, Store};
use boopd_types::config::AppConfig;
use boopd_types::Result;

const GRACE_MS: u64 = 3_600_000;

struct StaticTokens;

#[async_trait]
impl TokenService for StaticTokens {
    async fn generate_token(&self, uid: &str) -> Result<String> {
        Ok(format!("token-{uid}"))
    }
}

async fn seed_entry(store: &MemoryStore, client: &str, key: &str, value: serde_json::Value) {
    store
        .set(&path::bph_root().child(client).child(key), value)
        .await
        .expect("seed entry");
}

#[tokio::test]
async fn stale_entries_are_swept_fresh_ones_kept() -> Result<()> {
    let store = MemoryStore::new();
    let now = 10_000_000_000;

    // Stale: expired more than the grace period ago.
    seed_entry(&store, "a", "stale", json!([now - GRACE_MS - 1, 5])).await;
    // Expired, but inside the grace window: an owning session may
    // still be flushing.
    seed_entry(&store, "a", "graced", json!([now - 1_000, 3])).await;
    // Not expired at all.
    seed_entry(&store, "b", "live", json!([now + 1_000_000, 7])).await;

    let report = sweep_stale_entries(&store, now, GRACE_MS).await?;

    assert_eq!(report.clients_scanned, 2);
    assert_eq!(report.entries_scanned, 3);
    assert_eq!(report.removals_issued, 1);
    assert_eq!(report.removals_failed, 0);
    assert!(!report.reset_root);

    assert!(store.get(&path::bph_root().child("a").child("stale")).await?.is_none());
    assert!(store.get(&path::bph_root().child("a").child("graced")).await?.is_some());
    assert!(store.get(&path::bph_root().child("b").child("live")).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn malformed_entries_are_removed_and_the_sweep_continues() -> Result<()> {
    let store = MemoryStore::new();
    let now = 10_000_000_000;

    // One malformed entry early in iteration order must not stop the
    // sweep from reaching later clients.
    seed_entry(&store, "a", "junk", json!({"oops": true})).await;
    seed_entry(&store, "a", "fine", json!([now + 500_000, 2])).await;
    seed_entry(&store, "z", "stale", json!([now - GRACE_MS - 1, 4])).await;

    let report = sweep_stale_entries(&store, now, GRACE_MS).await?;

    assert_eq!(report.entries_scanned, 3);
    assert_eq!(report.removals_issued, 2);

    assert!(store.get(&path::bph_root().child("a").child("junk")).await?.is_none());
    assert!(store.get(&path::bph_root().child("a").child("fine")).await?.is_some());
    assert!(store.get(&path::bph_root().child("z").child("stale")).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn non_map_client_subtree_is_removed_whole() -> Result<()> {
    let store = MemoryStore::new();
    let now = 10_000_000_000;

    store
        .set(&path::bph_root().child("broken"), json!("not a map"))
        .await?;
    seed_entry(&store, "ok", "live", json!([now + 1_000, 1])).await;

    let report = sweep_stale_entries(&store, now, GRACE_MS).await?;

    assert_eq!(report.clients_scanned, 2);
    assert_eq!(report.removals_issued, 1);
    assert!(store.get(&path::bph_root().child("broken")).await?.is_none());
    assert!(store.get(&path::bph_root().child("ok")).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn non_map_root_is_reset_to_empty() -> Result<()> {
    let store = MemoryStore::new();
    store.set(&path::bph_root(), json!(12345)).await?;

    let report = sweep_stale_entries(&store, 10_000_000_000, GRACE_MS).await?;

    assert!(report.reset_root);
    assert_eq!(report.clients_scanned, 0);
    assert_eq!(store.get(&path::bph_root()).await?, Some(json!({})));
    Ok(())
}

#[tokio::test]
async fn absent_root_is_reset_and_sweep_ends() -> Result<()> {
    let store = MemoryStore::new();

    let report = sweep_stale_entries(&store, 10_000_000_000, GRACE_MS).await?;

    assert!(report.reset_root);
    assert_eq!(report.removals_issued, 0);
    Ok(())
}

#[tokio::test]
async fn empty_root_sweeps_cleanly() -> Result<()> {
    let store = MemoryStore::new();
    store.set(&path::bph_root(), json!({})).await?;

    let report = sweep_stale_entries(&store, 10_000_000_000, GRACE_MS).await?;

    assert!(!report.reset_root);
    assert_eq!(report.clients_scanned, 0);
    assert_eq!(report.removals_issued, 0);
    Ok(())
}

#[tokio::test]
async fn scheduled_janitor_runs_under_its_own_store_session() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let now = boopd_types::time::now_ms();

    seed_entry(&store, "a", "stale", json!([now.saturating_sub(GRACE_MS + 1_000), 5])).await;
    seed_entry(&store, "a", "live", json!([now + 1_000_000, 2])).await;

    let broker = CredentialBroker::new(
        &boopd_store::StoreConfig::default(),
        Arc::new(StaticTokens),
        Arc::new(MemoryConnector::new(store.clone())),
    );
    let janitor = Janitor::new(&broker, AppConfig::default());

    let report = janitor.run_once().await?;
    assert_eq!(report.removals_issued, 1);
    assert!(store.get(&path::bph_root().child("a").child("stale")).await?.is_none());
    assert!(store.get(&path::bph_root().child("a").child("live")).await?.is_some());

    // Sweeps are idempotent: a second run finds nothing to do.
    let again = janitor.run_once().await?;
    assert_eq!(again.removals_issued, 0);
    Ok(())
}
