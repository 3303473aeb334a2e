//! Cache groups: local store, remote owners and loader wired together

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::byteview::ByteView;
use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::flight::Flight;
use crate::peers::{Loader, PeerFetcher, PeerPicker};
use crate::stats::CacheStats;

/// A named, read-through cache namespace.
///
/// `get` serves from the local store when it can. A miss is coalesced per key
/// and resolved by the owning peer if one is registered, otherwise (or when
/// the peer fails) by the loader. Only loader results are stored locally
/// unless the group was built with
/// [`populate_from_peers`](GroupBuilder::populate_from_peers).
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: Cache,
    flight: Flight<Result<ByteView>>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    populate_from_peers: bool,
    stats: Arc<CacheStats>,
}

impl Group {
    /// Start building a group called `name`
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder::new(name)
    }

    /// Group name, unique within its registry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up `key`, loading it on a miss
    pub fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        self.stats.record_get();
        if let Some(value) = self.main_cache.get(key) {
            self.stats.record_hit();
            debug!(group = %self.name, key, "cache hit");
            return Ok(value);
        }

        self.flight.work(key, || self.load(key))
    }

    /// Attach the peer picker. Wiring happens once; a second call panics.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!("register_peers called more than once for group {}", self.name);
        }
    }

    /// Counters for this group
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of entries held locally
    pub fn cache_len(&self) -> usize {
        self.main_cache.len()
    }

    /// Bytes held locally
    pub fn cache_bytes_used(&self) -> i64 {
        self.main_cache.used_bytes()
    }

    fn load(&self, key: &str) -> Result<ByteView> {
        // A wave that finished just before this one may have filled the store
        if let Some(value) = self.main_cache.get(key) {
            self.stats.record_hit();
            return Ok(value);
        }

        if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
            match self.get_from_peer(peer.as_ref(), key) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    self.stats.record_peer_error();
                    warn!(group = %self.name, key, error = %err, "failed to get from peer, loading locally");
                }
            }
        }

        self.get_locally(key)
    }

    fn get_from_peer(&self, peer: &dyn PeerFetcher, key: &str) -> Result<ByteView> {
        let value = ByteView::from(peer.fetch(&self.name, key)?);
        self.stats.record_peer_load();
        if self.populate_from_peers {
            self.main_cache.put(key, value.clone());
        }
        Ok(value)
    }

    fn get_locally(&self, key: &str) -> Result<ByteView> {
        match self.loader.load(key) {
            Ok(bytes) => {
                self.stats.record_local_load();
                debug!(group = %self.name, key, len = bytes.len(), "loaded locally");
                // The loader handed over its buffer, so nothing else can alias it
                let value = ByteView::from(bytes);
                self.main_cache.put(key, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.stats.record_local_load_error();
                Err(err.into())
            }
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache_len", &self.cache_len())
            .field("has_peers", &self.peers.get().is_some())
            .field("populate_from_peers", &self.populate_from_peers)
            .finish()
    }
}

/// Builder for [`Group`]
pub struct GroupBuilder {
    name: String,
    cache_bytes: i64,
    loader: Option<Arc<dyn Loader>>,
    populate_from_peers: bool,
}

impl GroupBuilder {
    /// New builder with an unbounded store and no loader
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache_bytes: 0,
            loader: None,
            populate_from_peers: false,
        }
    }

    /// Byte budget of the local store; zero means unbounded
    pub fn cache_bytes(mut self, cache_bytes: i64) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }

    /// Loader called on misses no peer could serve
    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Same as [`loader`](Self::loader) for an already shared loader
    pub fn shared_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Also keep values fetched from peers in the local store.
    ///
    /// Off by default so that members do not duplicate each other's working
    /// sets.
    pub fn populate_from_peers(mut self, enabled: bool) -> Self {
        self.populate_from_peers = enabled;
        self
    }

    /// Build the group.
    ///
    /// # Panics
    /// If no loader was supplied.
    pub fn build(self) -> Group {
        let Some(loader) = self.loader else {
            panic!("group {} requires a loader", self.name);
        };

        let stats = Arc::new(CacheStats::new());
        Group {
            main_cache: Cache::new(self.cache_bytes, Arc::clone(&stats)),
            name: self.name,
            loader,
            flight: Flight::new(),
            peers: OnceLock::new(),
            populate_from_peers: self.populate_from_peers,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn scores() -> HashMap<&'static str, &'static str> {
        HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
    }

    /// Loader over `scores()` counting calls per key
    fn counting_loader(counts: Arc<parking_lot::Mutex<HashMap<String, usize>>>) -> impl Loader {
        let db = scores();
        move |key: &str| -> anyhow::Result<Vec<u8>> {
            *counts.lock().entry(key.to_string()).or_default() += 1;
            match db.get(key) {
                Some(v) => Ok(v.as_bytes().to_vec()),
                None => Err(anyhow::anyhow!("{key} not exist")),
            }
        }
    }

    struct StaticPicker(Option<Arc<dyn PeerFetcher>>);

    impl PeerPicker for StaticPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerFetcher>> {
            self.0.clone()
        }
    }

    struct DownPeer;

    impl PeerFetcher for DownPeer {
        fn fetch(&self, _group: &str, _key: &str) -> Result<Vec<u8>> {
            Err(Error::peer("10.0.0.9:7001", "connection refused"))
        }
    }

    struct EchoPeer {
        fetches: AtomicUsize,
    }

    impl PeerFetcher for EchoPeer {
        fn fetch(&self, group: &str, key: &str) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{group}/{key}@remote").into_bytes())
        }
    }

    #[test]
    fn test_get_then_load() {
        let counts = Arc::default();
        let group = Group::builder("scores")
            .cache_bytes(2 << 10)
            .loader(counting_loader(Arc::clone(&counts)))
            .build();

        for (k, v) in scores() {
            assert_eq!(group.get(k).unwrap(), v.as_bytes());
            assert_eq!(group.get(k).unwrap(), v.as_bytes());
            assert_eq!(counts.lock()[k], 1, "cache {k} miss");
        }

        assert_eq!(group.cache_len(), 3);
        assert_eq!(group.stats().hits(), 3);
        assert_eq!(group.stats().local_loads(), 3);
    }

    #[test]
    fn test_foo_bar() {
        let group = Group::builder("demo")
            .loader(|key: &str| -> anyhow::Result<Vec<u8>> {
                match key {
                    "foo" => Ok(b"bar".to_vec()),
                    _ => anyhow::bail!("{key} not exist"),
                }
            })
            .build();

        assert_eq!(group.get("foo").unwrap().to_string(), "bar");
        assert_eq!(group.get("foo").unwrap().to_string(), "bar");
        assert_eq!(group.stats().local_loads(), 1);
    }

    #[test]
    fn test_empty_key_rejected() {
        let counts = Arc::default();
        let group = Group::builder("scores")
            .loader(counting_loader(Arc::clone(&counts)))
            .build();

        assert!(matches!(group.get(""), Err(Error::EmptyKey)));
        assert!(counts.lock().is_empty());
        assert_eq!(group.stats().gets(), 0);
    }

    #[test]
    fn test_loader_error_not_cached() {
        let counts = Arc::default();
        let group = Group::builder("scores")
            .loader(counting_loader(Arc::clone(&counts)))
            .build();

        let err = group.get("unknown").unwrap_err();
        assert_eq!(err.load_error().unwrap().to_string(), "unknown not exist");
        assert!(group.get("unknown").is_err());

        assert_eq!(counts.lock()["unknown"], 2);
        assert_eq!(group.cache_len(), 0);
        assert_eq!(group.stats().local_load_errors(), 2);
    }

    #[test]
    fn test_peer_failure_falls_back_to_loader() {
        let counts = Arc::default();
        let group = Group::builder("scores")
            .loader(counting_loader(Arc::clone(&counts)))
            .build();
        group.register_peers(Arc::new(StaticPicker(Some(Arc::new(DownPeer)))));

        assert_eq!(group.get("Tom").unwrap(), b"630");
        assert_eq!(group.stats().peer_errors(), 1);
        assert_eq!(counts.lock()["Tom"], 1);
        assert_eq!(group.cache_len(), 1);
    }

    #[test]
    fn test_peer_values_not_cached_locally() {
        let counts = Arc::default();
        let peer = Arc::new(EchoPeer {
            fetches: AtomicUsize::new(0),
        });
        let group = Group::builder("scores")
            .loader(counting_loader(Arc::clone(&counts)))
            .build();
        group.register_peers(Arc::new(StaticPicker(Some(peer.clone()))));

        assert_eq!(group.get("Tom").unwrap(), b"scores/Tom@remote");
        assert_eq!(group.get("Tom").unwrap(), b"scores/Tom@remote");

        assert_eq!(peer.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(group.cache_len(), 0);
        assert!(counts.lock().is_empty());
        assert_eq!(group.stats().peer_loads(), 2);
    }

    #[test]
    fn test_populate_from_peers() {
        let peer = Arc::new(EchoPeer {
            fetches: AtomicUsize::new(0),
        });
        let group = Group::builder("scores")
            .loader(counting_loader(Arc::default()))
            .populate_from_peers(true)
            .build();
        group.register_peers(Arc::new(StaticPicker(Some(peer.clone()))));

        group.get("Tom").unwrap();
        group.get("Tom").unwrap();

        assert_eq!(peer.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(group.cache_len(), 1);
    }

    #[test]
    fn test_local_owner_uses_loader() {
        let counts = Arc::default();
        let group = Group::builder("scores")
            .loader(counting_loader(Arc::clone(&counts)))
            .build();
        group.register_peers(Arc::new(StaticPicker(None)));

        assert_eq!(group.get("Sam").unwrap(), b"567");
        assert_eq!(counts.lock()["Sam"], 1);
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn test_register_peers_twice_panics() {
        let group = Group::builder("scores")
            .loader(counting_loader(Arc::default()))
            .build();
        group.register_peers(Arc::new(StaticPicker(None)));
        group.register_peers(Arc::new(StaticPicker(None)));
    }

    #[test]
    #[should_panic(expected = "requires a loader")]
    fn test_missing_loader_panics() {
        let _ = Group::builder("scores").cache_bytes(1024).build();
    }

    #[test]
    fn test_concurrent_misses_load_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let group = Arc::new(
            Group::builder("slow")
                .loader(move |key: &str| -> anyhow::Result<Vec<u8>> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(200));
                    Ok(key.to_uppercase().into_bytes())
                })
                .build(),
        );

        let barrier = Arc::new(Barrier::new(12));
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let group = Arc::clone(&group);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    group.get("herd").unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), b"HERD");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eviction_reloads() {
        let counts = Arc::default();
        // Fits one of the entries, not two
        let group = Group::builder("scores")
            .cache_bytes(8)
            .loader(counting_loader(Arc::clone(&counts)))
            .build();

        group.get("Tom").unwrap();
        group.get("Sam").unwrap();
        group.get("Tom").unwrap();

        assert_eq!(counts.lock()["Tom"], 2);
        assert_eq!(group.stats().evictions(), 2);
        assert!(group.cache_bytes_used() <= 8);
    }
}
