//! Capabilities a group depends on: the data loader and the peer transport

use std::sync::Arc;

use crate::error::Result;

/// Source of truth for a group, called on a miss that no peer served.
///
/// Implemented for any `Fn(&str) -> anyhow::Result<Vec<u8>>` closure. It may be
/// called concurrently for different keys, but only once per wave of callers
/// for the same key.
pub trait Loader: Send + Sync {
    /// Produce the value for `key`
    fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

impl<F> Loader for F
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self(key)
    }
}

/// Picks the remote member that owns a key
pub trait PeerPicker: Send + Sync {
    /// The owning peer, or `None` when the key belongs to this node or no
    /// remote member is known
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>>;
}

/// Client for one remote member
pub trait PeerFetcher: Send + Sync {
    /// Ask the remote member for `key` in `group`.
    ///
    /// Any non-success answer must be an error, never empty bytes.
    fn fetch(&self, group: &str, key: &str) -> Result<Vec<u8>>;
}
