//! In-memory reference implementation of the [`Store`] contract.
//!
//! Backs every test in the workspace and doubles as a local-dev
//! store. The tree is a single [`serde_json::Value`] behind a mutex;
//! subscriptions are fan-out mpsc senders that are notified by
//! diffing the subscribed subtree around each mutation, so the event
//! stream matches what a reactive database would emit regardless of
//! which operation caused the change.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use boopd_types::time::now_ms;
use boopd_types::{BoopdError, Result};

use crate::adapter::{ChildEvent, ChildStream, Store, ValueStream};
use crate::auth::{StoreConnector, StoreSession};
use crate::path::StorePath;

/// Convenience alias.
type BResult<T> = Result<T>;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Thread-safe in-memory JSON tree with reactive subscriptions.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    push_seq: AtomicU64,
}

struct Inner {
    root: Value,
    child_subs: Vec<ChildSub>,
    value_subs: Vec<ValueSub>,
}

struct ChildSub {
    path: StorePath,
    tx: mpsc::UnboundedSender<ChildEvent>,
}

struct ValueSub {
    path: StorePath,
    tx: mpsc::UnboundedSender<Value>,
    last: Value,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: Value::Object(Map::new()),
                child_subs: Vec::new(),
                value_subs: Vec::new(),
            }),
            push_seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> BResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| BoopdError::StoreError {
            reason: "memory store lock poisoned".into(),
        })
    }

    /// Generates a unique, roughly time-ordered push key.
    ///
    /// Fixed-width hex fields keep lexicographic order aligned with
    /// creation order; the sequence number guarantees uniqueness even
    /// within one millisecond.
    fn next_push_key(&self) -> String {
        let seq = self.push_seq.fetch_add(1, Ordering::Relaxed) as u32;
        let salt: u16 = rand::random();
        format!("{:012x}{seq:08x}{salt:04x}", now_ms())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Store impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &StorePath) -> BResult<Option<Value>> {
        let inner = self.lock()?;
        Ok(node_at(&inner.root, path).cloned())
    }

    async fn set(&self, path: &StorePath, value: Value) -> BResult<()> {
        let mut inner = self.lock()?;
        let before = inner.snapshot_subscribed();
        *node_at_mut(&mut inner.root, path) = value;
        inner.notify(before);
        Ok(())
    }

    async fn push(&self, path: &StorePath, value: Value) -> BResult<String> {
        let key = self.next_push_key();
        let mut inner = self.lock()?;
        let before = inner.snapshot_subscribed();
        *node_at_mut(&mut inner.root, &path.child(&key)) = value;
        inner.notify(before);
        Ok(key)
    }

    async fn remove(&self, path: &StorePath) -> BResult<()> {
        let mut inner = self.lock()?;
        let before = inner.snapshot_subscribed();
        remove_at(&mut inner.root, path);
        inner.notify(before);
        Ok(())
    }

    async fn atomic_add(&self, path: &StorePath, delta: i64) -> BResult<i64> {
        let mut inner = self.lock()?;

        let current = match node_at(&inner.root, path) {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| BoopdError::StoreError {
                reason: format!("leaf at '{path}' is not an integer"),
            })?,
            Some(other) => {
                return Err(BoopdError::StoreError {
                    reason: format!("leaf at '{path}' is not numeric: {other}"),
                });
            }
        };

        let updated = current + delta;
        let before = inner.snapshot_subscribed();
        *node_at_mut(&mut inner.root, path) = updated.into();
        inner.notify(before);
        Ok(updated)
    }

    fn subscribe_children(&self, path: &StorePath) -> BResult<ChildStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;
        inner.child_subs.push(ChildSub {
            path: path.clone(),
            tx,
        });
        Ok(rx)
    }

    fn subscribe_value(&self, path: &StorePath) -> BResult<ValueStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;
        let last = node_at(&inner.root, path).cloned().unwrap_or(Value::Null);
        inner.value_subs.push(ValueSub {
            path: path.clone(),
            tx,
            last,
        });
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Subscription bookkeeping
// ---------------------------------------------------------------------------

impl Inner {
    /// Snapshots the direct children of every child-subscribed path.
    ///
    /// Taken immediately before a mutation; [`notify`](Self::notify)
    /// diffs against it afterwards.
    fn snapshot_subscribed(&self) -> Vec<BTreeMap<String, Value>> {
        self.child_subs
            .iter()
            .map(|sub| children_map(&self.root, &sub.path))
            .collect()
    }

    /// Diffs subscribed subtrees against `before` and delivers the
    /// resulting events. Subscribers whose stream was dropped are
    /// pruned here.
    fn notify(&mut self, before: Vec<BTreeMap<String, Value>>) {
        // Child subscriptions: added / changed / removed keys.
        let mut keep = Vec::with_capacity(self.child_subs.len());
        for (sub, old) in self.child_subs.iter().zip(before) {
            let new = children_map(&self.root, &sub.path);
            let mut alive = true;

            for (key, value) in &new {
                if old.get(key) != Some(value) {
                    alive &= sub
                        .tx
                        .send(ChildEvent::Added {
                            key: key.clone(),
                            value: value.clone(),
                        })
                        .is_ok();
                }
            }
            for key in old.keys() {
                if !new.contains_key(key) {
                    alive &= sub.tx.send(ChildEvent::Removed { key: key.clone() }).is_ok();
                }
            }

            keep.push(alive);
        }
        let mut flags = keep.into_iter();
        self.child_subs.retain(|_| flags.next().unwrap_or(false));

        // Value subscriptions: deliver on change only.
        let root = &self.root;
        self.value_subs.retain_mut(|sub| {
            let current = node_at(root, &sub.path).cloned().unwrap_or(Value::Null);
            if current == sub.last {
                return !sub.tx.is_closed();
            }
            sub.last = current.clone();
            sub.tx.send(current).is_ok()
        });
    }
}

/// Direct children of the map at `path`; empty for leaves and holes.
fn children_map(root: &Value, path: &StorePath) -> BTreeMap<String, Value> {
    match node_at(root, path) {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Tree navigation
// ---------------------------------------------------------------------------

fn node_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// Walks to `path`, materializing intermediate objects. A non-object
/// intermediate is overwritten, matching document-store semantics.
fn node_at_mut<'a>(root: &'a mut Value, path: &StorePath) -> &'a mut Value {
    let mut node = root;
    for segment in path.segments() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("just materialized an object")
            .entry(segment.to_owned())
            .or_insert(Value::Null);
    }
    node
}

fn remove_at(root: &mut Value, path: &StorePath) {
    let segments: Vec<&str> = path.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        match node.as_object_mut().and_then(|map| map.get_mut(*segment)) {
            Some(next) => node = next,
            None => return,
        }
    }

    if let Some(map) = node.as_object_mut() {
        map.remove(*last);
    }
}

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// [`StoreConnector`] over a shared [`MemoryStore`].
///
/// Signin accepts any token — credentials are meaningful only for
/// real database backends.
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    /// Wraps a shared store.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn signin(&self, _token: &str) -> BResult<StoreSession> {
        Ok(StoreSession::new(self.store.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
