//! Subscription behavior of the in-memory reference store.

use std::sync::Arc;

use serde_json::json;

use boopd_store::{ChildEvent, MemoryStore, Store, StorePath};
use boopd_types::Result;

fn bph_client() -> StorePath {
    StorePath::new("bph").child("client-a")
}

#[tokio::test]
async fn child_added_fires_for_set_and_push() -> Result<()> {
    let store = MemoryStore::new();
    let path = bph_client();
    let mut events = store.subscribe_children(&path)?;

    store.set(&path.child("manual"), json!([10, 1])).await?;
    let key = store.push(&path, json!([20, 2])).await?;

    match events.try_recv().expect("set should notify") {
        ChildEvent::Added { key, value } => {
            assert_eq!(key, "manual");
            assert_eq!(value, json!([10, 1]));
        }
        other => panic!("unexpected event {other:?}"),
    }
    match events.try_recv().expect("push should notify") {
        ChildEvent::Added { key: pushed, value } => {
            assert_eq!(pushed, key);
            assert_eq!(value, json!([20, 2]));
        }
        other => panic!("unexpected event {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn child_removed_fires_for_remove() -> Result<()> {
    let store = MemoryStore::new();
    let path = bph_client();
    store.set(&path.child("k1"), json!([10, 1])).await?;

    let mut events = store.subscribe_children(&path)?;
    store.remove(&path.child("k1")).await?;

    assert!(matches!(
        events.try_recv(),
        Ok(ChildEvent::Removed { key }) if key == "k1"
    ));
    Ok(())
}

#[tokio::test]
async fn removing_the_whole_subtree_emits_per_child_removals() -> Result<()> {
    let store = MemoryStore::new();
    let path = bph_client();
    store.set(&path.child("k1"), json!([10, 1])).await?;
    store.set(&path.child("k2"), json!([20, 2])).await?;

    let mut events = store.subscribe_children(&path)?;
    store.remove(&path).await?;

    let mut removed = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ChildEvent::Removed { key } => removed.push(key),
            other => panic!("unexpected event {other:?}"),
        }
    }
    removed.sort();
    assert_eq!(removed, vec!["k1", "k2"]);
    Ok(())
}

#[tokio::test]
async fn subscription_sees_only_post_subscribe_changes() -> Result<()> {
    let store = MemoryStore::new();
    let path = bph_client();
    store.set(&path.child("old"), json!([10, 1])).await?;

    let mut events = store.subscribe_children(&path)?;
    assert!(events.try_recv().is_err(), "no replay of existing children");

    store.set(&path.child("new"), json!([20, 2])).await?;
    assert!(matches!(
        events.try_recv(),
        Ok(ChildEvent::Added { key, .. }) if key == "new"
    ));
    Ok(())
}

#[tokio::test]
async fn value_subscription_dedupes_unchanged_writes() -> Result<()> {
    let store = MemoryStore::new();
    let gbc = StorePath::new("gbc");
    store.set(&gbc, json!(42)).await?;

    let mut values = store.subscribe_value(&gbc)?;

    store.set(&gbc, json!(42)).await?; // no change, no event
    assert!(values.try_recv().is_err());

    store.atomic_add(&gbc, 1).await?;
    assert_eq!(values.try_recv().expect("add should notify"), json!(43));
    Ok(())
}

#[tokio::test]
async fn value_subscription_reports_removal_as_null() -> Result<()> {
    let store = MemoryStore::new();
    let gbc = StorePath::new("gbc");
    store.set(&gbc, json!(42)).await?;

    let mut values = store.subscribe_value(&gbc)?;
    store.remove(&gbc).await?;
    assert_eq!(values.try_recv().expect("removal should notify"), json!(null));
    Ok(())
}

#[tokio::test]
async fn dropped_subscriptions_do_not_break_writes() -> Result<()> {
    let store = MemoryStore::new();
    let path = bph_client();
    let events = store.subscribe_children(&path)?;
    drop(events);

    store.set(&path.child("k"), json!([10, 1])).await?;
    assert_eq!(store.get(&path.child("k")).await?, Some(json!([10, 1])));
    Ok(())
}

#[tokio::test]
async fn concurrent_atomic_adds_lose_nothing() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gbc = StorePath::new("gbc");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let gbc = gbc.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                store.atomic_add(&gbc, 1).await.expect("atomic add");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    assert_eq!(store.get(&gbc).await?, Some(json!(200)));
    Ok(())
}
