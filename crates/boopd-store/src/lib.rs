//! Store access for the boopd counter core.
//!
//! The durable database is an external collaborator. This crate holds
//! everything the core needs to talk to it:
//!
//! - [`adapter`] — the [`Store`](adapter::Store) trait: the thin
//!   contract over a JSON-tree, reactive document database
//!   (get/set/push/remove/atomic-add plus child and value
//!   subscriptions).
//! - [`path`] — typed paths for the persisted layout
//!   (`gbc`, `bph/<clientId>/<pushKey>`).
//! - [`memory`] — a complete in-memory [`Store`](adapter::Store)
//!   implementation used by tests and local development.
//! - [`auth`] — the credential collaborator: token minting behind a
//!   TTL cache, and signin producing a releasable store session.
//! - [`config`] — the configuration blob handed to the adapter and
//!   the token service parameters.

pub mod adapter;
pub mod auth;
pub mod config;
pub mod memory;
pub mod path;

pub use adapter::{ChildEvent, ChildStream, Store, ValueStream};
pub use auth::{CredentialBroker, StoreConnector, StoreSession, TokenService};
pub use config::StoreConfig;
pub use memory::{MemoryConnector, MemoryStore};
pub use path::StorePath;
