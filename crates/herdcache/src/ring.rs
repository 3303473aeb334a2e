//! Consistent hash ring mapping keys to cluster members
//!
//! Each member occupies `replicas` virtual positions on a 32-bit ring. A key
//! belongs to the first position at or after its own hash, wrapping around to
//! the lowest position.

use std::fmt;

/// Hash function used to place members and keys on the ring
pub type HashFn = fn(&[u8]) -> u32;

/// Virtual positions per member when none is configured
pub const DEFAULT_REPLICAS: usize = 50;

/// One position on the ring
#[derive(Debug, Clone, Copy)]
struct VirtualNode {
    position: u32,
    /// Index into `HashRing::members`
    member: usize,
}

/// Consistent hash ring over string member identifiers
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Sorted by position
    nodes: Vec<VirtualNode>,
    members: Vec<String>,
}

impl HashRing {
    /// Create an empty ring using CRC-32 (IEEE)
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32fast::hash)
    }

    /// Create an empty ring with a custom hash function
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            nodes: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Replace the whole membership, rebuilding every virtual position.
    ///
    /// Replica `i` of member `m` sits at `hash(format!("{i}{m}"))`. When two
    /// positions collide, the member listed first owns it.
    pub fn set<I, S>(&mut self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = members.into_iter().map(Into::into).collect();
        self.nodes.clear();
        self.nodes.reserve(self.members.len() * self.replicas);

        for (member, id) in self.members.iter().enumerate() {
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{i}{id}").as_bytes());
                self.nodes.push(VirtualNode { position, member });
            }
        }

        // Stable, so equal positions keep member order
        self.nodes.sort_by_key(|node| node.position);
    }

    /// Member owning `key`, or `None` when the ring is empty
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.nodes.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.nodes.partition_point(|node| node.position < hash);
        let node = self.nodes[idx % self.nodes.len()];
        Some(&self.members[node.member])
    }

    /// Current members, in the order they were set
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Virtual positions per member
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Number of virtual positions on the ring
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if no member is registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("members", &self.members)
            .field("positions", &self.nodes.len())
            .finish()
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS)
    }
}
