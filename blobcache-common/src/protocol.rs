//! # Peer Wire Protocol
//!
//! Purpose: Pin down the handful of constants and encodings the peer RPC
//! client and server must agree on.
//!
//! ## Wire Format
//!
//! ```text
//! GET    /_cache/<group>/<percent-encoded key>
//!   200  x-expire: <unix millis, 0 = never>   body: raw bytes
//!   404  authoritative absence
//!   5xx  transient failure
//! DELETE /_cache/<group>/<percent-encoded key>
//!   200 / 404 both mean "gone"
//! ```
//!
//! Expiry travels as absolute wall-clock milliseconds so that a byte-view
//! fetched from a peer expires at the same instant on both nodes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Reserved URL prefix for inter-peer RPC.
pub const PEER_PATH_PREFIX: &str = "/_cache";

/// Response header carrying the entry's absolute expiry in unix milliseconds.
pub const EXPIRE_HEADER: &str = "x-expire";

/// Builds the peer RPC path for a group/key pair.
///
/// The key is percent-encoded as a single path segment; `/` inside keys
/// becomes `%2F` so routers see exactly one trailing segment.
pub fn peer_path(group: &str, key: &str) -> String {
    format!("{PEER_PATH_PREFIX}/{group}/{}", urlencoding::encode(key))
}

/// Encodes an optional absolute expiry as unix milliseconds, 0 = never.
pub fn encode_expiry(expires_at: Option<SystemTime>) -> u64 {
    match expires_at {
        Some(at) => at
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_millis() as u64)
            .unwrap_or(0),
        None => 0,
    }
}

/// Decodes unix milliseconds into an optional absolute expiry, 0 = never.
pub fn decode_expiry(millis: u64) -> Option<SystemTime> {
    if millis == 0 {
        return None;
    }
    Some(UNIX_EPOCH + Duration::from_millis(millis))
}
