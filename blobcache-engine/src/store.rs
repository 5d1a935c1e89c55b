//! # LRU Store
//!
//! Provide the byte-bounded ordered store backing a group's main and hot
//! tiers, with LRU eviction and lazy TTL expiry.
//!
//! ## Design Principles
//!
//! 1. **Single Mutex**: Every operation reorders the LRU list, so there is no
//!    read/write split; one lock per store keeps the discipline obvious.
//! 2. **Byte-Based Eviction**: Capacity is a payload-byte budget, not an
//!    entry count; the tail is evicted until the budget holds.
//! 3. **Arc-backed Keys**: The map and the node share one `Arc<str>` key
//!    buffer to avoid duplicate allocations.
//! 4. **Expiry On Access**: An entry read past its deadline is removed and
//!    reported as a miss; no background sweeper is required.
//!
//! ## Structure Overview
//!
//! ```text
//! LruStore
//!   ├── gets/hits/evictions: AtomicU64
//!   └── inner: Mutex<StoreInner>
//!         ├── map: HashMap<Arc<str>, usize>
//!         ├── nodes: Vec<Option<Node>>
//!         ├── free: Vec<usize>
//!         ├── head/tail: LRU indices
//!         └── used_bytes
//! ```

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::SystemTime;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::view::ByteView;

/// Point-in-time counters for one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Sum of payload bytes currently held.
    pub bytes: u64,
    /// Number of live entries.
    pub items: u64,
    /// Lookups served, hit or miss.
    pub gets: u64,
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Entries dropped for capacity or expiry.
    pub evictions: u64,
}

/// Internal node representing a single key/value entry.
///
/// Uses an index-based intrusive list for O(1) LRU updates without heap
/// pointers. `head` is the oldest entry, `tail` the most recently used.
#[derive(Debug)]
struct Node {
    // Shared key buffer; map stores the same Arc to avoid duplicate allocations.
    key: Arc<str>,
    view: ByteView,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct StoreInner {
    /// Key -> node index for O(1) lookup.
    map: HashMap<Arc<str>, usize, RandomState>,
    /// Dense node storage for cache-friendly scans.
    nodes: Vec<Option<Node>>,
    /// Free-list for recycling node slots.
    free: Vec<usize>,
    /// LRU head (oldest) and tail (most recent).
    head: Option<usize>,
    tail: Option<usize>,
    /// Sum of payload bytes across live entries.
    used_bytes: u64,
}

impl StoreInner {
    fn new() -> Self {
        StoreInner {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            used_bytes: 0,
        }
    }

    /// Detaches `idx` from the LRU list.
    fn lru_remove(&mut self, idx: usize) {
        let (prev, next) = match self.nodes[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        if let Some(prev_idx) = prev {
            if let Some(prev_node) = self.nodes[prev_idx].as_mut() {
                prev_node.next = next;
            }
        } else {
            self.head = next;
        }

        if let Some(next_idx) = next {
            if let Some(next_node) = self.nodes[next_idx].as_mut() {
                next_node.prev = prev;
            }
        } else {
            self.tail = prev;
        }

        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    /// Appends `idx` to the LRU tail (most recently used).
    fn lru_push_back(&mut self, idx: usize) {
        let tail = self.tail;
        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = tail;
            node.next = None;
        }

        if let Some(tail_idx) = tail {
            if let Some(tail_node) = self.nodes[tail_idx].as_mut() {
                tail_node.next = Some(idx);
            }
        } else {
            self.head = Some(idx);
        }

        self.tail = Some(idx);
    }

    /// Marks a node as recently used by moving it to the tail.
    fn touch(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.lru_remove(idx);
        self.lru_push_back(idx);
    }

    /// Inserts a new node and returns its slot index.
    fn insert_new(&mut self, key: Arc<str>, view: ByteView) -> usize {
        let idx = self.free.pop().unwrap_or_else(|| {
            self.nodes.push(None);
            self.nodes.len() - 1
        });

        self.used_bytes += view.len() as u64;
        self.nodes[idx] = Some(Node {
            key: Arc::clone(&key),
            view,
            prev: None,
            next: None,
        });
        self.lru_push_back(idx);
        self.map.insert(key, idx);
        idx
    }

    /// Removes a node by index, updating the map, LRU links, and byte count.
    fn remove_idx(&mut self, idx: usize) {
        let node = match self.nodes[idx].as_ref() {
            Some(node) => node,
            None => return,
        };
        let key = Arc::clone(&node.key);
        let size = node.view.len() as u64;

        // Detach before clearing the slot so LRU pointers stay valid.
        self.lru_remove(idx);
        self.nodes[idx] = None;
        self.map.remove(key.as_ref());
        self.free.push(idx);
        self.used_bytes -= size;
    }

    /// Removes the least-recently-used node; returns false when empty.
    fn pop_lru(&mut self) -> bool {
        match self.head {
            Some(idx) => {
                self.remove_idx(idx);
                true
            }
            None => false,
        }
    }
}

/// Byte-bounded LRU store with lazy TTL expiry.
///
/// Capacity 0 disables eviction entirely.
#[derive(Debug)]
pub struct LruStore {
    inner: Mutex<StoreInner>,
    max_bytes: u64,
    gets: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

impl LruStore {
    /// Creates a store evicting past `max_bytes` of payload; 0 = unbounded.
    pub fn new(max_bytes: u64) -> Self {
        LruStore {
            inner: Mutex::new(StoreInner::new()),
            max_bytes,
            gets: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Inserts or replaces `key`, marks it most recently used, and evicts
    /// from the tail while over budget.
    pub fn add(&self, key: &str, view: ByteView) {
        let mut inner = self.inner.lock();

        if let Some(&idx) = inner.map.get(key) {
            if let Some(node) = inner.nodes[idx].as_mut() {
                let old_size = node.view.len() as u64;
                let new_size = view.len() as u64;
                node.view = view;
                inner.used_bytes = inner.used_bytes - old_size + new_size;
                inner.touch(idx);
            }
        } else {
            let key_arc: Arc<str> = Arc::from(key);
            inner.insert_new(key_arc, view);
        }

        if self.max_bytes > 0 {
            while inner.used_bytes > self.max_bytes {
                if !inner.pop_lru() {
                    break;
                }
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Looks `key` up, refreshing its LRU position on a live hit.
    ///
    /// An entry past its deadline is removed (counted as an eviction) and
    /// reported as a miss.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now();
        let mut inner = self.inner.lock();

        let idx = *inner.map.get(key)?;
        let expired = inner.nodes[idx]
            .as_ref()
            .map(|node| node.view.is_expired(now))
            .unwrap_or(true);

        if expired {
            inner.remove_idx(idx);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let view = inner.nodes[idx].as_ref().map(|node| node.view.clone());
        inner.touch(idx);
        self.hits.fetch_add(1, Ordering::Relaxed);
        view
    }

    /// Drops `key` if present.
    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.map.get(key) {
            inner.remove_idx(idx);
        }
    }

    /// Point-in-time counters for this store.
    pub fn stats(&self) -> StoreStats {
        let (bytes, items) = {
            let inner = self.inner.lock();
            (inner.used_bytes, inner.map.len() as u64)
        };
        StoreStats {
            bytes,
            items,
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn view(data: &'static [u8]) -> ByteView {
        ByteView::new(data, None)
    }

    #[test]
    fn add_get_roundtrip() {
        let store = LruStore::new(0);
        store.add("alpha", view(b"value"));
        let got = store.get("alpha").unwrap();
        assert_eq!(got.payload().as_ref(), b"value");

        let stats = store.stats();
        assert_eq!(stats.bytes, 5);
        assert_eq!(stats.items, 1);
        assert_eq!(stats.gets, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn evicts_oldest_first() {
        // Five 3-byte values into a 10-byte budget: the two oldest go.
        let store = LruStore::new(10);
        for key in ["k1", "k2", "k3", "k4", "k5"] {
            store.add(key, view(b"abc"));
        }

        assert!(store.get("k1").is_none());
        assert!(store.get("k2").is_none());
        assert!(store.get("k3").is_some());
        assert!(store.get("k4").is_some());
        assert!(store.get("k5").is_some());

        let stats = store.stats();
        assert_eq!(stats.bytes, 9);
        assert_eq!(stats.items, 3);
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn get_refreshes_lru_position() {
        let store = LruStore::new(8);
        store.add("a", view(b"1234"));
        store.add("b", view(b"1234"));
        store.get("a");
        store.add("c", view(b"1234"));

        assert!(store.get("b").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn replace_updates_byte_accounting() {
        let store = LruStore::new(0);
        store.add("a", view(b"aaaa"));
        store.add("a", view(b"bb"));

        let stats = store.stats();
        assert_eq!(stats.bytes, 2);
        assert_eq!(stats.items, 1);
        assert_eq!(store.get("a").unwrap().payload().as_ref(), b"bb");
    }

    #[test]
    fn capacity_bound_holds_after_every_add() {
        let store = LruStore::new(16);
        for i in 0..100 {
            let key = format!("key-{i}");
            store.add(&key, ByteView::new(vec![0u8; 5], None));
            assert!(store.stats().bytes <= 16);
        }
    }

    #[test]
    fn expired_entry_is_a_miss_and_an_eviction() {
        let store = LruStore::new(0);
        let deadline = SystemTime::now() + Duration::from_millis(50);
        store.add("k", ByteView::new(&b"v"[..], Some(deadline)));

        assert!(store.get("k").is_some());
        std::thread::sleep(Duration::from_millis(80));
        assert!(store.get("k").is_none());

        let stats = store.stats();
        assert_eq!(stats.items, 0);
        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.gets, 2);
    }

    #[test]
    fn remove_clears_entry_and_bytes() {
        let store = LruStore::new(0);
        store.add("a", view(b"12345"));
        store.remove("a");
        store.remove("missing");

        let stats = store.stats();
        assert_eq!(stats.items, 0);
        assert_eq!(stats.bytes, 0);
        assert!(store.get("a").is_none());
    }

    #[test]
    fn zero_capacity_never_evicts() {
        let store = LruStore::new(0);
        for i in 0..1000 {
            store.add(&format!("k{i}"), view(b"abcdefgh"));
        }
        let stats = store.stats();
        assert_eq!(stats.items, 1000);
        assert_eq!(stats.evictions, 0);
    }
}
