//! # Peer RPC Client
//!
//! Provide the HTTP side of inter-peer traffic: fetch a blob from its
//! owning node, or ask a node to drop one.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `PeerClient` hides connection pooling and the wire
//!    format behind the engine's `PeerTransport` trait.
//! 2. **Fail Fast**: Any non-200/404 answer surfaces immediately as a peer
//!    error; the engine decides whether to fall back.
//! 3. **Absence Is Not Failure**: A 404 travels as `NotFound` so callers can
//!    tell "the blob does not exist" from "the peer is unhealthy".

mod transport;

pub use transport::PeerClient;
