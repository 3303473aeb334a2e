//! Error types for herdcache

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for herdcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by cache groups and their collaborators.
///
/// `Error` is `Clone` because a single coalesced load hands the same outcome
/// to every caller waiting on that key.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The caller asked for the empty key
    #[error("key is required")]
    EmptyKey,

    /// The group's loader failed; the original error is kept intact
    #[error("load failed: {0:#}")]
    Load(Arc<anyhow::Error>),

    /// A remote member could not serve the request
    #[error("peer {peer} failed: {reason}")]
    Peer {
        /// Member identifier of the remote node
        peer: String,
        /// Transport or remote-side failure description
        reason: String,
    },

    /// No group is registered under this name
    #[error("group {0} not found")]
    GroupNotFound(String),

    /// A group with this name is already registered
    #[error("group {0} already exists")]
    GroupExists(String),
}

impl Error {
    /// Build a peer error from any displayable reason
    pub fn peer(peer: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Peer {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    /// The loader's error, if this is a load failure
    pub fn load_error(&self) -> Option<&anyhow::Error> {
        match self {
            Error::Load(err) => Some(err),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Load(Arc::new(err))
    }
}
