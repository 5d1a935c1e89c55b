//! # Group Engine
//!
//! Orchestrate a lookup across the two local tiers, the owning peer, and the
//! backend filler, recording statistics at every step.
//!
//! ## Lookup Path
//!
//! ```text
//! get(key)
//!   ├── hot/main hit ──────────────────────────────▶ return
//!   └── single-flight load
//!         ├── re-check both stores (lost the race) ▶ return
//!         ├── owner is remote ──▶ peer fetch
//!         │     ├── ok: maybe promote to hot ──────▶ return
//!         │     ├── 404: absence ──────────────────▶ not-found
//!         │     └── transport error ──▶ fall through
//!         └── local fill ──▶ populate main ────────▶ return
//! ```
//!
//! The single-flight table bounds this node to one in-progress load per key;
//! the ring bounds the cluster to one owner per key. Together they yield
//! at-most-one backend fetch per key in steady state.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use async_trait::async_trait;
use rand::Rng;

use blobcache_common::{CacheError, CacheResult};

use crate::ring::{Owner, PeerResolver};
use crate::singleflight::SingleFlight;
use crate::store::{LruStore, StoreStats};
use crate::view::ByteView;

/// Hot-store capacity as a fraction of the main store.
const HOT_CAPACITY_DIVISOR: u64 = 8;

/// Default odds of promoting a remote read into the hot store (1 in N).
const DEFAULT_HOT_PROMOTION_ODDS: u32 = 10;

/// Loads a missing blob from the authoritative backend.
///
/// Invoked by the engine only on the owning node. Implementations are passed
/// by value into [`Group::builder`]; the engine never reaches into globals.
#[async_trait]
pub trait Filler: Send + Sync {
    async fn fill(&self, key: &str) -> CacheResult<ByteView>;
}

/// Carries fetch and invalidate RPCs to remote peers.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Fetches `key` from `peer`'s copy of `group`.
    ///
    /// `NotFound` means authoritative absence; `Peer` means the node was
    /// unreachable or failing, and the caller may fall back to a local load.
    async fn fetch(&self, peer: &str, group: &str, key: &str) -> CacheResult<ByteView>;

    /// Asks `peer` to drop `key` from its local stores.
    async fn remove(&self, peer: &str, group: &str, key: &str) -> CacheResult<()>;
}

/// Transport used until peers are configured; every call fails as a peer
/// error, which sends the engine down the local-load path.
struct DisconnectedTransport;

#[async_trait]
impl PeerTransport for DisconnectedTransport {
    async fn fetch(&self, peer: &str, _group: &str, _key: &str) -> CacheResult<ByteView> {
        Err(CacheError::Peer(format!("no transport configured for {peer}")))
    }

    async fn remove(&self, peer: &str, _group: &str, _key: &str) -> CacheResult<()> {
        Err(CacheError::Peer(format!("no transport configured for {peer}")))
    }
}

#[derive(Debug, Default)]
struct GroupCounters {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    peer_get_max_latency_ms: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
    server_requests: AtomicU64,
}

/// Atomic snapshot of the engine counters plus both store tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub gets: u64,
    pub cache_hits: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub peer_get_max_latency_ms: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub server_requests: u64,
    pub main: StoreStats,
    pub hot: StoreStats,
}

struct GroupInner {
    name: String,
    main: LruStore,
    hot: LruStore,
    filler: Arc<dyn Filler>,
    resolver: Arc<PeerResolver>,
    transport: Arc<dyn PeerTransport>,
    flight: SingleFlight,
    counters: GroupCounters,
    hot_promotion_odds: u32,
}

/// A named cache instance: main + hot stores, filler, peer scope, stats.
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

/// Configures and builds a [`Group`].
pub struct GroupBuilder {
    name: String,
    filler: Arc<dyn Filler>,
    max_bytes: u64,
    resolver: Option<Arc<PeerResolver>>,
    transport: Option<Arc<dyn PeerTransport>>,
    hot_promotion_odds: u32,
}

impl GroupBuilder {
    /// Main-store capacity in payload bytes; the hot store gets 1/8 of it.
    /// 0 = unbounded.
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Peer resolver; defaults to an empty ring (everything local).
    pub fn resolver(mut self, resolver: Arc<PeerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Peer RPC transport; required once the resolver has remote peers.
    pub fn transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 1-in-N odds of mirroring a remote read into the hot store.
    /// 1 promotes always.
    pub fn hot_promotion_odds(mut self, odds: u32) -> Self {
        self.hot_promotion_odds = odds.max(1);
        self
    }

    pub fn build(self) -> Group {
        let hot_bytes = self.max_bytes / HOT_CAPACITY_DIVISOR;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(PeerResolver::new(String::new())));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(DisconnectedTransport));

        Group {
            inner: Arc::new(GroupInner {
                name: self.name,
                main: LruStore::new(self.max_bytes),
                hot: LruStore::new(hot_bytes),
                filler: self.filler,
                resolver,
                transport,
                flight: SingleFlight::new(),
                counters: GroupCounters::default(),
                hot_promotion_odds: self.hot_promotion_odds,
            }),
        }
    }
}

impl Group {
    /// Starts building a group around its name and filler.
    pub fn builder(name: impl Into<String>, filler: Arc<dyn Filler>) -> GroupBuilder {
        GroupBuilder {
            name: name.into(),
            filler,
            max_bytes: 0,
            resolver: None,
            transport: None,
            hot_promotion_odds: DEFAULT_HOT_PROMOTION_ODDS,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Looks up `key`, filling from the owner or the backend on a miss.
    pub async fn get(&self, key: &str) -> CacheResult<ByteView> {
        let counters = &self.inner.counters;
        counters.gets.fetch_add(1, Ordering::Relaxed);

        if let Some(view) = self.inner.main.get(key) {
            counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(view);
        }
        if let Some(view) = self.inner.hot.get(key) {
            counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(view);
        }

        let this = self.clone();
        let flight_key = key.to_string();
        let (result, shared) = self
            .inner
            .flight
            .run(key, move || async move { this.load(&flight_key).await })
            .await;

        counters.loads.fetch_add(1, Ordering::Relaxed);
        if shared {
            counters.loads_deduped.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Serves a fetch arriving over peer RPC.
    pub async fn peer_get(&self, key: &str) -> CacheResult<ByteView> {
        self.inner
            .counters
            .server_requests
            .fetch_add(1, Ordering::Relaxed);
        self.get(key).await
    }

    /// The uncoalesced load path; runs inside the single-flight task.
    async fn load(&self, key: &str) -> CacheResult<ByteView> {
        let counters = &self.inner.counters;

        // Another caller may have populated a store while this one queued.
        if let Some(view) = self.inner.main.get(key) {
            return Ok(view);
        }
        if let Some(view) = self.inner.hot.get(key) {
            return Ok(view);
        }

        if let Owner::Remote(peer) = self.inner.resolver.owner(key) {
            let started = Instant::now();
            match self
                .inner
                .transport
                .fetch(&peer, &self.inner.name, key)
                .await
            {
                Ok(view) => {
                    counters.peer_loads.fetch_add(1, Ordering::Relaxed);
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    counters
                        .peer_get_max_latency_ms
                        .fetch_max(elapsed_ms, Ordering::Relaxed);
                    if self.promote_to_hot() {
                        self.inner.hot.add(key, view.clone());
                    }
                    return Ok(view);
                }
                // The owner says the blob does not exist; a local fill would
                // only repeat the same backend miss.
                Err(CacheError::NotFound) => return Err(CacheError::NotFound),
                Err(err) => {
                    tracing::warn!(%peer, key, error = %err, "peer fetch failed, falling back to local load");
                    counters.peer_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        counters.local_loads.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "pulling into cache from backend");
        match self.inner.filler.fill(key).await {
            Ok(view) => {
                self.inner.main.add(key, view.clone());
                Ok(view)
            }
            Err(err) => {
                counters.local_load_errs.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    fn promote_to_hot(&self) -> bool {
        let odds = self.inner.hot_promotion_odds;
        odds <= 1 || rand::thread_rng().gen_range(0..odds) == 0
    }

    /// Invalidates `key`: best-effort DELETE to the remote owner, then drop
    /// from both local stores.
    pub fn remove(&self, key: &str) {
        if let Owner::Remote(peer) = self.inner.resolver.owner(key) {
            let transport = Arc::clone(&self.inner.transport);
            let group = self.inner.name.clone();
            let owned_key = key.to_string();
            tokio::spawn(async move {
                if let Err(err) = transport.remove(&peer, &group, &owned_key).await {
                    tracing::warn!(%peer, key = %owned_key, error = %err, "peer invalidation failed");
                }
            });
        }
        self.remove_local(key);
    }

    /// Drops `key` from the local stores only; used by the peer RPC server
    /// so invalidations do not echo between nodes.
    pub fn remove_local(&self, key: &str) {
        self.inner.main.remove(key);
        self.inner.hot.remove(key);
    }

    /// Atomic snapshot of the engine and per-store counters.
    pub fn stats(&self) -> StatsSnapshot {
        let counters = &self.inner.counters;
        StatsSnapshot {
            gets: counters.gets.load(Ordering::Relaxed),
            cache_hits: counters.cache_hits.load(Ordering::Relaxed),
            loads: counters.loads.load(Ordering::Relaxed),
            loads_deduped: counters.loads_deduped.load(Ordering::Relaxed),
            peer_loads: counters.peer_loads.load(Ordering::Relaxed),
            peer_errors: counters.peer_errors.load(Ordering::Relaxed),
            peer_get_max_latency_ms: counters.peer_get_max_latency_ms.load(Ordering::Relaxed),
            local_loads: counters.local_loads.load(Ordering::Relaxed),
            local_load_errs: counters.local_load_errs.load(Ordering::Relaxed),
            server_requests: counters.server_requests.load(Ordering::Relaxed),
            main: self.inner.main.stats(),
            hot: self.inner.hot.stats(),
        }
    }
}
