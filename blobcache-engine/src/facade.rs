//! # Cache Façade
//!
//! Purpose: Expose the compact `get`/`remove`/`stats` surface the REST layer
//! consumes, applying the per-call deadline so handlers never wait on a slow
//! backend longer than configured.

use std::time::Duration;

use bytes::Bytes;

use blobcache_common::{CacheError, CacheResult};

use crate::group::{Group, StatsSnapshot};

/// Handle over a [`Group`] with the configured per-call timeout.
///
/// This is a facade: the engine stays reachable through [`Cache::group`] for
/// the peer RPC server, which applies no extra deadline of its own.
#[derive(Clone)]
pub struct Cache {
    group: Group,
    get_timeout: Duration,
}

impl Cache {
    /// Wraps `group`; `get_timeout` of zero disables the deadline.
    pub fn new(group: Group, get_timeout: Duration) -> Self {
        Cache { group, get_timeout }
    }

    /// Fetches a blob's bytes, bounded by the configured deadline.
    ///
    /// A timed-out caller observes `DeadlineExceeded` while the underlying
    /// load keeps running for any coalesced waiters still inside theirs.
    pub async fn get(&self, key: &str) -> CacheResult<Bytes> {
        if self.get_timeout.is_zero() {
            return self.group.get(key).await.map(|view| view.into_payload());
        }
        match tokio::time::timeout(self.get_timeout, self.group.get(key)).await {
            Ok(result) => result.map(|view| view.into_payload()),
            Err(_) => Err(CacheError::DeadlineExceeded),
        }
    }

    /// Invalidates a key locally and, best-effort, on its remote owner.
    pub fn remove(&self, key: &str) {
        self.group.remove(key);
    }

    /// Snapshot of engine and store counters, suitable for periodic scrape.
    pub fn stats(&self) -> StatsSnapshot {
        self.group.stats()
    }

    /// The underlying engine.
    pub fn group(&self) -> &Group {
        &self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::group::Filler;
    use crate::view::ByteView;

    struct SlowFiller {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Filler for SlowFiller {
        async fn fill(&self, _key: &str) -> CacheResult<ByteView> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(ByteView::new(&b"slow"[..], None))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deadline_applies_but_load_survives_for_others() {
        let filler = Arc::new(SlowFiller {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(300),
        });
        let group = Group::builder("s3", filler.clone()).build();

        let impatient = Cache::new(group.clone(), Duration::from_millis(5));
        let patient = Cache::new(group, Duration::from_secs(5));

        let impatient_call = tokio::spawn({
            let impatient = impatient.clone();
            async move { impatient.get("k").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let patient_call = patient.get("k");

        assert_eq!(
            impatient_call.await.unwrap(),
            Err(CacheError::DeadlineExceeded)
        );
        assert_eq!(patient_call.await.unwrap(), Bytes::from_static(b"slow"));
        assert_eq!(filler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_timeout_waits_indefinitely() {
        let filler = Arc::new(SlowFiller {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(30),
        });
        let cache = Cache::new(Group::builder("s3", filler).build(), Duration::ZERO);
        assert_eq!(cache.get("k").await.unwrap(), Bytes::from_static(b"slow"));
    }
}
