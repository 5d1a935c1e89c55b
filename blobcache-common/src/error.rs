//! # Error Types
//!
//! Purpose: Give every crate in the workspace one vocabulary for the
//! failure modes that cross component boundaries.
//!
//! ## Design Principles
//! 1. **Cloneable Failures**: A coalesced load hands the same error to every
//!    waiter, so variants carry owned strings instead of source errors.
//! 2. **Fail Fast**: Configuration problems are their own variant and are
//!    only produced at startup.
//! 3. **Caller Decides Retries**: Nothing in the core retries; transient and
//!    permanent failures stay distinguishable so callers can.

/// Result type shared across the cache crates.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced across the cache core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The key's owner reports absence: the backend's not-found, or a 404
    /// from the remote peer.
    #[error("blob not found")]
    NotFound,

    /// Peer RPC failed in transit or the peer answered 5xx. The engine falls
    /// back to a local load on this variant.
    #[error("peer error: {0}")]
    Peer(String),

    /// The object-store fill failed. Propagated to the caller, never cached.
    #[error("backend error: {0}")]
    Backend(String),

    /// The caller's deadline elapsed while the load was still running.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invalid startup configuration. Fatal, never produced after boot.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns true when the failure is worth a local-load fallback.
    pub fn is_transient_peer(&self) -> bool {
        matches!(self, CacheError::Peer(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_cloneable_and_comparable() {
        let err = CacheError::Peer("connection refused".to_string());
        assert_eq!(err.clone(), err);
        assert!(err.is_transient_peer());
        assert!(!CacheError::NotFound.is_transient_peer());
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(CacheError::NotFound.to_string(), "blob not found");
        assert_eq!(
            CacheError::Backend("boom".to_string()).to_string(),
            "backend error: boom"
        );
    }
}
