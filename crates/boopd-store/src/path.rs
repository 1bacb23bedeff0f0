//! Typed paths into the persisted layout.
//!
//! ```text
//! gbc                          : integer ≥ 0
//! bph/<clientId>/<pushKey>     : [validUntil, change]
//! ```

use std::fmt;

use boopd_types::ClientId;

// ---------------------------------------------------------------------------
// StorePath
// ---------------------------------------------------------------------------

/// Slash-separated path into the store's JSON tree.
///
/// Segments never contain `/`; [`ClientId`] escaping guarantees this
/// for client-derived segments, and push keys are store-assigned.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StorePath(String);

impl StorePath {
    /// Creates a path from a pre-joined string.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Appends one segment.
    pub fn child(&self, segment: &str) -> Self {
        debug_assert!(!segment.is_empty(), "path segments must not be empty");
        debug_assert!(!segment.contains('/'), "path segments must not contain '/'");
        Self(format!("{}/{segment}", self.0))
    }

    /// Returns the joined representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the individual segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Layout helpers
// ---------------------------------------------------------------------------

/// Path of the shared global counter leaf.
pub fn gbc() -> StorePath {
    StorePath::new("gbc")
}

/// Root of all hourly rate-limit ledgers.
pub fn bph_root() -> StorePath {
    StorePath::new("bph")
}

/// One client's ledger subtree.
pub fn bph_client(client_id: &ClientId) -> StorePath {
    bph_root().child(client_id.as_str())
}

/// One ledger entry.
pub fn bph_entry(client_id: &ClientId, key: &str) -> StorePath {
    bph_client(client_id).child(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
