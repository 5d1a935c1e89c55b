//! # Distributed Cache Engine
//!
//! Core of the blobcache node: a two-tier in-memory store partitioned across
//! peers by consistent hashing, with per-key load coalescing and a pluggable
//! backend filler.
//!
//! ## Structure Overview
//!
//! ```text
//! Cache (façade, per-call deadline)
//!   └── Group
//!         ├── main / hot: LruStore
//!         ├── resolver: PeerResolver (consistent-hash ring)
//!         ├── transport: dyn PeerTransport (peer RPC)
//!         ├── filler: dyn Filler (backend)
//!         └── flight: SingleFlight
//! ```

pub mod facade;
pub mod group;
pub mod ring;
pub mod singleflight;
pub mod store;
pub mod view;

pub use facade::Cache;
pub use group::{Filler, Group, GroupBuilder, PeerTransport, StatsSnapshot};
pub use ring::{Owner, PeerResolver};
pub use singleflight::SingleFlight;
pub use store::{LruStore, StoreStats};
pub use view::ByteView;

// Shared error vocabulary, re-exported so embedders need one import.
pub use blobcache_common::{CacheError, CacheResult};
