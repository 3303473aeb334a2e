//! Byte-budgeted LRU (Least Recently Used) store
//!
//! Entries live in an arena of slots linked by index, so promote and evict
//! are O(1) without per-entry allocations. Not synchronised; see
//! [`Cache`](crate::cache::Cache) for the locked wrapper.

use std::collections::HashMap;

use ahash::RandomState;

/// A value that knows its own size in bytes
pub trait Value {
    /// Size charged against the byte budget
    fn len(&self) -> usize;
}

/// Callback run with every evicted entry, while the store is borrowed
pub type OnEvicted<V> = Box<dyn FnMut(&str, &V) + Send>;

/// Slot in the recency list
struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU store bounded by total key plus value bytes
pub struct LruCache<V> {
    map: HashMap<String, usize, RandomState>,
    nodes: Vec<Option<Node<V>>>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    free_list: Vec<usize>,
    /// Zero means unbounded
    max_bytes: i64,
    used_bytes: i64,
    on_evicted: Option<OnEvicted<V>>,
}

fn entry_bytes(key: &str, value: &impl Value) -> i64 {
    key.len() as i64 + value.len() as i64
}

impl<V: Value> LruCache<V> {
    /// Create a store holding at most `max_bytes` of keys and values.
    ///
    /// A budget of zero disables eviction entirely.
    pub fn new(max_bytes: i64, on_evicted: Option<OnEvicted<V>>) -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            max_bytes,
            used_bytes: 0,
            on_evicted,
        }
    }

    /// Look up a value, marking it most recently used
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Insert or replace a value, then evict until within budget
    pub fn put(&mut self, key: &str, value: V) {
        if let Some(&idx) = self.map.get(key) {
            if let Some(node) = &mut self.nodes[idx] {
                self.used_bytes += value.len() as i64 - node.value.len() as i64;
                node.value = value;
            }
            self.move_to_front(idx);
        } else {
            self.used_bytes += entry_bytes(key, &value);

            let idx = self.alloc_node();
            self.nodes[idx] = Some(Node {
                key: key.to_owned(),
                value,
                prev: None,
                next: self.head,
            });

            if let Some(head_idx) = self.head {
                if let Some(head) = &mut self.nodes[head_idx] {
                    head.prev = Some(idx);
                }
            }

            self.head = Some(idx);
            if self.tail.is_none() {
                self.tail = Some(idx);
            }

            self.map.insert(key.to_owned(), idx);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes && self.tail.is_some() {
            self.remove_oldest();
        }
    }

    /// Evict the least recently used entry, if any
    pub fn remove_oldest(&mut self) {
        let Some(tail_idx) = self.tail else {
            return;
        };

        self.unlink(tail_idx);
        self.free_node(tail_idx);
        if let Some(node) = self.nodes[tail_idx].take() {
            self.map.remove(&node.key);
            self.used_bytes -= entry_bytes(&node.key, &node.value);
            if let Some(callback) = self.on_evicted.as_mut() {
                callback(&node.key, &node.value);
            }
        }
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes currently charged against the budget
    pub fn used_bytes(&self) -> i64 {
        self.used_bytes
    }

    /// Configured budget (zero means unbounded)
    pub fn max_bytes(&self) -> i64 {
        self.max_bytes
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn alloc_node(&mut self) -> usize {
        match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}
