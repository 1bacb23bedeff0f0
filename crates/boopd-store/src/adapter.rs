//! The thin contract over the reactive document database.
//!
//! The core never sees a concrete database type — sessions and the
//! janitor work against [`Store`] exclusively. All operations are
//! asynchronous and fallible; callers treat every failure as
//! transient (log, restore shadow state, retry on the next cycle).

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use boopd_types::Result;

use crate::path::StorePath;

// ---------------------------------------------------------------------------
// Subscription events
// ---------------------------------------------------------------------------

/// Change to a direct child of a subscribed path.
#[derive(Clone, Debug)]
pub enum ChildEvent {
    /// A child appeared, or an existing child's value changed.
    Added {
        /// Key of the child under the subscribed path.
        key: String,
        /// The child's new value.
        value: Value,
    },
    /// A child was removed.
    Removed {
        /// Key of the removed child.
        key: String,
    },
}

/// Stream of [`ChildEvent`]s. Dropping the stream unsubscribes.
pub type ChildStream = mpsc::UnboundedReceiver<ChildEvent>;

/// Stream of value snapshots for a subscribed leaf. Dropping the
/// stream unsubscribes.
pub type ValueStream = mpsc::UnboundedReceiver<Value>;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Required capabilities of the durable store (a JSON-tree, reactive
/// database).
///
/// # Subscription contract
///
/// Subscriptions deliver only changes made **after** the call; the
/// caller reads the initial state explicitly with [`get`](Self::get).
/// Both subscription kinds are synchronous to establish — the stream
/// is live before the call returns, so no change between subscribing
/// and the initial read can be missed (it may be delivered twice,
/// which consumers tolerate).
///
/// # Concurrency
///
/// Writes to the global counter go through
/// [`atomic_add`](Self::atomic_add), never read-modify-write. Ledger
/// appends use [`push`](Self::push) so keys are store-assigned,
/// unique, and roughly time-ordered.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads the value at `path`. `None` when nothing is stored there.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>>;

    /// Writes `value` at `path`, creating intermediate nodes.
    async fn set(&self, path: &StorePath, value: Value) -> Result<()>;

    /// Appends `value` under `path` with a store-assigned key and
    /// returns that key.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String>;

    /// Removes the value (or subtree) at `path`. Removing an absent
    /// path succeeds.
    async fn remove(&self, path: &StorePath) -> Result<()>;

    /// Atomically adds `delta` to the numeric leaf at `path`
    /// (an absent leaf counts as 0) and returns the new value.
    async fn atomic_add(&self, path: &StorePath, delta: i64) -> Result<i64>;

    /// Subscribes to child additions and removals under `path`.
    fn subscribe_children(&self, path: &StorePath) -> Result<ChildStream>;

    /// Subscribes to value changes at `path`.
    fn subscribe_value(&self, path: &StorePath) -> Result<ValueStream>;
}
