//! Immutable byte payloads exchanged between stores, peers, and fillers.

use std::time::SystemTime;

use bytes::Bytes;

/// Immutable view over a cached payload plus its absolute expiry.
///
/// Cloning is cheap: the payload is a reference-counted `Bytes` and is never
/// mutated after creation. Expiry is wall-clock time because views travel
/// between peers and must mean the same instant on every node; `None` never
/// expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteView {
    payload: Bytes,
    expires_at: Option<SystemTime>,
}

impl ByteView {
    /// Creates a view over `payload` expiring at `expires_at`.
    pub fn new(payload: impl Into<Bytes>, expires_at: Option<SystemTime>) -> Self {
        ByteView {
            payload: payload.into(),
            expires_at,
        }
    }

    /// Borrows the payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the view, returning the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Absolute expiry, `None` = never.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Payload length in bytes; this is the size eviction accounts for.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns true when the view has expired at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_payload() {
        let view = ByteView::new(Bytes::from_static(b"payload"), None);
        let clone = view.clone();
        assert_eq!(view, clone);
        assert_eq!(clone.len(), 7);
        assert!(!clone.is_empty());
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let now = SystemTime::now();
        let view = ByteView::new(Bytes::from_static(b"x"), Some(now + Duration::from_secs(1)));
        assert!(!view.is_expired(now));
        assert!(view.is_expired(now + Duration::from_secs(1)));
        assert!(view.is_expired(now + Duration::from_secs(2)));

        let forever = ByteView::new(Bytes::from_static(b"x"), None);
        assert!(!forever.is_expired(now + Duration::from_secs(3600)));
    }
}
