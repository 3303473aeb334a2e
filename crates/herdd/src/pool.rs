//! Cluster membership: hash ring plus one client per member

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use herdcache::{HashRing, PeerFetcher, PeerPicker};
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::client::RespPeer;

struct PoolState {
    ring: HashRing,
    clients: HashMap<String, Arc<RespPeer>, RandomState>,
}

/// Picks the member owning a key and hands out its client.
///
/// Membership is replaced wholesale by [`set`](Self::set); lookups only take
/// the read lock.
pub struct PeerPool {
    self_addr: String,
    replicas: usize,
    timeout: Duration,
    runtime: Handle,
    state: RwLock<PoolState>,
}

impl PeerPool {
    pub fn new(self_addr: impl Into<String>, replicas: usize, timeout: Duration, runtime: Handle) -> Self {
        Self {
            self_addr: self_addr.into(),
            replicas,
            timeout,
            runtime,
            state: RwLock::new(PoolState {
                ring: HashRing::new(replicas),
                clients: HashMap::default(),
            }),
        }
    }

    /// Replace the membership. `peers` should include this node's own
    /// address so it keeps its share of keys.
    pub fn set<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = HashRing::new(self.replicas);
        ring.set(peers.iter().cloned());
        let clients = peers
            .iter()
            .filter(|peer| **peer != self.self_addr)
            .map(|peer| {
                let client = RespPeer::new(peer.clone(), self.runtime.clone(), self.timeout);
                (peer.clone(), Arc::new(client))
            })
            .collect();

        *self.state.write() = PoolState { ring, clients };
        info!(node = %self.self_addr, ?peers, "peers set");
    }

    /// This node's member identifier
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Current members
    pub fn peers(&self) -> Vec<String> {
        self.state.read().ring.members().to_vec()
    }
}

impl PeerPicker for PeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>> {
        let state = self.state.read();
        let owner = state.ring.get(key)?;
        if owner.is_empty() || owner == self.self_addr {
            return None;
        }

        let client = state.clients.get(owner)?;
        debug!(node = %self.self_addr, peer = client.addr(), key, "pick peer");
        Some(Arc::clone(client) as Arc<dyn PeerFetcher>)
    }
}
