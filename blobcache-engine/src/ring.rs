//! # Peer Resolver
//!
//! Map every cache key to exactly one owning peer with a consistent-hash
//! ring, so all nodes agree on ownership without coordination.
//!
//! ## Design Principles
//!
//! 1. **Deterministic Hash**: crc32 with no per-process seed; every node
//!    builds the identical ring from the identical peer list.
//! 2. **Virtual Nodes**: 50 points per peer smooth the key distribution.
//! 3. **Lock-Free Lookup**: The ring is an immutable snapshot behind an
//!    atomic pointer; `set_peers` builds a new ring and swaps it in, so a
//!    concurrent lookup sees the old or the new ring, never a partial one.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// Virtual points per peer on the ring.
const DEFAULT_REPLICAS: usize = 50;

/// The peer a key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// This node owns the key; load locally.
    Local,
    /// The peer at this base URL owns the key.
    Remote(String),
}

/// Immutable ring snapshot: sorted virtual points mapping to peer indices.
#[derive(Debug, Default)]
struct Ring {
    /// `(point, peer index)`, sorted by point.
    points: Vec<(u32, usize)>,
    peers: Vec<String>,
}

impl Ring {
    fn build(peers: &[String], replicas: usize) -> Self {
        let mut points = Vec::with_capacity(peers.len() * replicas);
        for (peer_idx, peer) in peers.iter().enumerate() {
            for replica in 0..replicas {
                let point = crc32fast::hash(format!("{peer}/{replica}").as_bytes());
                points.push((point, peer_idx));
            }
        }
        points.sort_unstable();

        Ring {
            points,
            peers: peers.to_vec(),
        }
    }

    /// Smallest point >= hash, wrapping to the first point.
    fn lookup(&self, hash: u32) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|&(point, _)| point < hash);
        let (_, peer_idx) = self.points[idx % self.points.len()];
        Some(self.peers[peer_idx].as_str())
    }
}

/// Resolves keys to their owning peer and distinguishes self from remote.
#[derive(Debug)]
pub struct PeerResolver {
    self_url: String,
    replicas: usize,
    ring: ArcSwap<Ring>,
}

impl PeerResolver {
    /// Creates a resolver with an empty ring; every key is local until
    /// [`set_peers`](Self::set_peers) is called.
    pub fn new(self_url: impl Into<String>) -> Self {
        Self::with_replicas(self_url, DEFAULT_REPLICAS)
    }

    /// Creates a resolver with a caller-chosen virtual-node count.
    pub fn with_replicas(self_url: impl Into<String>, replicas: usize) -> Self {
        PeerResolver {
            self_url: self_url.into(),
            replicas: replicas.max(1),
            ring: ArcSwap::from_pointee(Ring::default()),
        }
    }

    /// Replaces the peer set, rebuilding the ring atomically.
    pub fn set_peers(&self, peers: &[String]) {
        let ring = Ring::build(peers, self.replicas);
        self.ring.store(Arc::new(ring));
    }

    /// Returns the peer owning `key`. An empty ring owns everything locally.
    pub fn owner(&self, key: &str) -> Owner {
        let hash = crc32fast::hash(key.as_bytes());
        let ring = self.ring.load();
        match ring.lookup(hash) {
            Some(peer) if peer != self.self_url => Owner::Remote(peer.to_string()),
            _ => Owner::Local,
        }
    }

    /// The base URL this node identifies itself with on the ring.
    pub fn self_url(&self) -> &str {
        &self.self_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn empty_ring_owns_locally() {
        let resolver = PeerResolver::new("http://localhost:8080");
        assert_eq!(resolver.owner("any-key"), Owner::Local);
    }

    #[test]
    fn ownership_is_stable() {
        let resolver = PeerResolver::new("http://a:8080");
        resolver.set_peers(&peers(&["http://a:8080", "http://b:8080", "http://c:8080"]));

        for key in ["foo#bar", "models#weights.bin", "x", ""] {
            let first = resolver.owner(key);
            for _ in 0..50 {
                assert_eq!(resolver.owner(key), first);
            }
        }
    }

    #[test]
    fn every_peer_owns_some_keys() {
        let resolver = PeerResolver::new("http://a:8080");
        let urls = peers(&["http://a:8080", "http://b:8080", "http://c:8080"]);
        resolver.set_peers(&urls);

        let mut local = 0usize;
        let mut remote_b = 0usize;
        let mut remote_c = 0usize;
        for i in 0..1000 {
            match resolver.owner(&format!("bucket#object-{i}")) {
                Owner::Local => local += 1,
                Owner::Remote(url) if url == "http://b:8080" => remote_b += 1,
                Owner::Remote(_) => remote_c += 1,
            }
        }
        assert!(local > 0);
        assert!(remote_b > 0);
        assert!(remote_c > 0);
    }

    #[test]
    fn reconfiguration_changes_ownership_atomically() {
        let resolver = PeerResolver::new("http://a:8080");
        resolver.set_peers(&peers(&["http://a:8080", "http://b:8080"]));

        let before: Vec<Owner> = (0..100)
            .map(|i| resolver.owner(&format!("k{i}")))
            .collect();

        // Same list again: nothing moves.
        resolver.set_peers(&peers(&["http://a:8080", "http://b:8080"]));
        for (i, owner) in before.iter().enumerate() {
            assert_eq!(&resolver.owner(&format!("k{i}")), owner);
        }

        // Dropping b routes everything to the sole remaining peer: self.
        resolver.set_peers(&peers(&["http://a:8080"]));
        for i in 0..100 {
            assert_eq!(resolver.owner(&format!("k{i}")), Owner::Local);
        }
    }

    #[test]
    fn nodes_agree_on_ownership() {
        let urls = peers(&["http://a:8080", "http://b:8080", "http://c:8080"]);
        let a = PeerResolver::new("http://a:8080");
        let b = PeerResolver::new("http://b:8080");
        a.set_peers(&urls);
        b.set_peers(&urls);

        for i in 0..200 {
            let key = format!("bucket#blob-{i}");
            let owner_by_a = match a.owner(&key) {
                Owner::Local => "http://a:8080".to_string(),
                Owner::Remote(url) => url,
            };
            let owner_by_b = match b.owner(&key) {
                Owner::Local => "http://b:8080".to_string(),
                Owner::Remote(url) => url,
            };
            assert_eq!(owner_by_a, owner_by_b);
        }
    }
}
