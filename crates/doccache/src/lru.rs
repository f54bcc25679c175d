//! LRU (Least Recently Used) cache implementation
//!
//! Uses an intrusive linked list over a slab for O(1) promotion and
//! eviction. Capacity is optional; an unbounded cache never evicts.

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

use crate::error::{Error, Result};

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU cache with an optional capacity bound.
///
/// Any successful `get`/`get_opt` or an overwriting `set` promotes the
/// key to most-recently-used. When a bounded cache grows past its
/// capacity, exactly one entry is evicted: the least-recently-used.
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: Option<usize>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a bounded LRU cache holding at most `capacity` entries
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        Self::with_limit(Some(capacity))
    }

    /// Create an unbounded cache that never evicts
    pub fn unbounded() -> Self {
        Self::with_limit(None)
    }

    fn with_limit(capacity: Option<usize>) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(capacity.unwrap_or(0), RandomState::new()),
            nodes: Vec::with_capacity(capacity.unwrap_or(0)),
            head: None,
            tail: None,
            free_list: Vec::new(),
            capacity,
        }
    }

    /// Get a value, promoting the key to most-recently-used.
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` if the key is absent
    pub fn get(&mut self, key: &K) -> Result<&V> {
        match self.get_opt(key) {
            Some(value) => Ok(value),
            None => Err(Error::NotFound),
        }
    }

    /// Non-raising variant of [`get`](Self::get).
    ///
    /// Promotes on hit, returns `None` on absence.
    pub fn get_opt(&mut self, key: &K) -> Option<&V> {
        if let Some(&idx) = self.map.get(key) {
            self.move_to_front(idx);
            self.nodes[idx].as_ref().map(|node| &node.value)
        } else {
            None
        }
    }

    /// Insert a key-value pair.
    ///
    /// Overwriting an existing key re-positions it as most-recently-used.
    /// Returns the evicted entry when a bounded cache overflows; at most
    /// one entry is evicted per insert.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            // Update existing
            if let Some(node) = &mut self.nodes[idx] {
                node.value = value;
            }
            self.move_to_front(idx);
            return None;
        }

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
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

        self.map.insert(key, idx);

        if self.capacity.is_some_and(|cap| self.map.len() > cap) {
            return self.evict();
        }

        None
    }

    /// Membership test; does NOT alter recency order
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Remove a key from the cache.
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` if the key is absent
    pub fn remove(&mut self, key: &K) -> Result<V> {
        if let Some(idx) = self.map.remove(key) {
            self.unlink(idx);
            self.free_node(idx);
            self.nodes[idx]
                .take()
                .map(|node| node.value)
                .ok_or(Error::NotFound)
        } else {
            Err(Error::NotFound)
        }
    }

    /// Get the current size of the cache
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get the capacity bound, or `None` if unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterate over keys from least- to most-recently used
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            nodes: &self.nodes,
            cursor: self.tail,
        }
    }

    /// Full key ordering from least- to most-recently used
    pub fn lru_order(&self) -> Vec<K> {
        self.keys().cloned().collect()
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return; // Already at front
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
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn evict(&mut self) -> Option<(K, V)> {
        let tail_idx = self.tail?;
        // Unlink while the node is still present so head/tail stay valid
        self.unlink(tail_idx);
        let node = self.nodes[tail_idx].take()?;
        self.map.remove(&node.key);
        self.free_node(tail_idx);
        Some((node.key, node.value))
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

/// Iterator over cache keys in least- to most-recently-used order
pub struct Keys<'a, K, V> {
    nodes: &'a [Option<Node<K, V>>],
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        let idx = self.cursor?;
        let node = self.nodes[idx].as_ref()?;
        self.cursor = node.prev;
        Some(&node.key)
    }
}
