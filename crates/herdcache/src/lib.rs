//! # herdcache
//!
//! Distributed read-through cache groups.
//!
//! ## Architecture
//! - **LRU store**: arena-backed list with a byte budget ([`LruCache`])
//! - **Hash ring**: consistent hashing with virtual nodes ([`HashRing`])
//! - **Flight**: per-key call coalescing ([`Flight`])
//! - **Group**: local store, then the owning peer, then the loader ([`Group`])
//!
//! Groups live in an explicit [`Registry`]. Reaching other members is left to
//! a transport implementing [`PeerPicker`] and [`PeerFetcher`].

#![warn(missing_docs)]

mod byteview;
mod cache;
mod error;
mod flight;
mod group;
mod lru;
mod peers;
mod registry;
mod ring;
mod stats;

pub use byteview::ByteView;
pub use cache::Cache;
pub use error::{Error, Result};
pub use flight::Flight;
pub use group::{Group, GroupBuilder};
pub use lru::{LruCache, OnEvicted, Value};
pub use peers::{Loader, PeerFetcher, PeerPicker};
pub use registry::Registry;
pub use ring::{HashFn, HashRing, DEFAULT_REPLICAS};
pub use stats::CacheStats;
