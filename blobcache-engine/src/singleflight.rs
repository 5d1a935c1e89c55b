//! # Single-Flight Coalescer
//!
//! Admit one in-progress load per key; every concurrent caller for the same
//! key waits on that load and shares its result.
//!
//! ## Design Principles
//!
//! 1. **Detached Loads**: The load future runs on its own task. A waiter
//!    whose deadline fires merely stops waiting; the load completes and
//!    later waiters still observe its result.
//! 2. **Short Critical Sections**: The table mutex guards only the inflight
//!    map; the load itself always runs outside the lock.
//! 3. **Prompt Cleanup**: The inflight entry is removed before the result is
//!    published, so a caller arriving after completion starts a fresh load.

use std::future::Future;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::watch;

use blobcache_common::{CacheError, CacheResult};

use crate::view::ByteView;

type LoadResult = CacheResult<ByteView>;
type FlightMap = HashMap<String, watch::Receiver<Option<LoadResult>>>;

/// Per-key load coalescing table.
#[derive(Debug, Default)]
pub struct SingleFlight {
    inflight: Arc<Mutex<FlightMap>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        SingleFlight {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `load` for `key`, coalescing with any in-progress load.
    ///
    /// Returns the shared result plus `true` when this caller joined a
    /// flight started by someone else.
    pub async fn run<F, Fut>(&self, key: &str, load: F) -> (LoadResult, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let (mut rx, shared) = {
            let mut inflight = self.inflight.lock();
            match inflight.get(key) {
                Some(rx) => (rx.clone(), true),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.to_string(), rx.clone());

                    let fut = load();
                    let map = Arc::clone(&self.inflight);
                    let flight_key = key.to_string();
                    tokio::spawn(async move {
                        let result = fut.await;
                        map.lock().remove(&flight_key);
                        // Fails only when every waiter gave up; the load's
                        // side effects (store population) already happened.
                        let _ = tx.send(Some(result));
                    });

                    (rx, false)
                }
            }
        };

        let result = match rx.wait_for(Option::is_some).await {
            Ok(value) => match value.as_ref() {
                Some(result) => result.clone(),
                None => Err(CacheError::Backend("load resolved without a result".to_string())),
            },
            Err(_) => Err(CacheError::Backend("load task aborted".to_string())),
        };
        (result, shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;

    fn flight_value() -> ByteView {
        ByteView::new(Bytes::from_static(b"v"), None)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_load() {
        let flight = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("k", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(flight_value())
                    })
                    .await
            }));
        }

        let mut shared_count = 0;
        for handle in handles {
            let (result, shared) = handle.await.unwrap();
            assert_eq!(result.unwrap().payload().as_ref(), b"v");
            if shared {
                shared_count += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared_count, 19);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_waiter_does_not_abort_the_flight() {
        let flight = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                flight
                    .run("k", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(flight_value())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // This waiter gives up long before the load finishes.
        let impatient = tokio::time::timeout(
            Duration::from_millis(10),
            flight.run("k", || async { Ok(flight_value()) }),
        )
        .await;
        assert!(impatient.is_err());

        // A patient waiter still sees the original flight's result.
        let (result, shared) = flight.run("k", || async { Ok(flight_value()) }).await;
        assert!(shared);
        assert_eq!(result.unwrap().payload().as_ref(), b"v");

        let (leader_result, leader_shared) = leader.await.unwrap();
        assert!(!leader_shared);
        assert!(leader_result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_shared_then_forgotten() {
        let flight = SingleFlight::new();

        let (result, _) = flight
            .run("k", || async { Err(CacheError::NotFound) })
            .await;
        assert_eq!(result, Err(CacheError::NotFound));

        // The failed flight is gone; the next run executes fresh.
        let (result, shared) = flight.run("k", || async { Ok(flight_value()) }).await;
        assert!(!shared);
        assert!(result.is_ok());
    }
}
