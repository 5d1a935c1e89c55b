//! The backend filler: resolves cache misses against the object store.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use blobcache_common::key::split_key;
use blobcache_common::{CacheError, CacheResult};
use blobcache_engine::{ByteView, Filler};
use blobcache_s3::BlobStore;

/// Downloads `bucket#object` keys from the object store, stamping each view
/// with the configured TTL. A zero TTL produces entries that never expire.
///
/// The engine invokes this only on the owning node, under single-flight.
pub struct S3Filler {
    store: Arc<BlobStore>,
    ttl: Duration,
}

impl S3Filler {
    pub fn new(store: Arc<BlobStore>, ttl: Duration) -> Self {
        S3Filler { store, ttl }
    }
}

#[async_trait]
impl Filler for S3Filler {
    async fn fill(&self, key: &str) -> CacheResult<ByteView> {
        let (bucket, object) = split_key(key)
            .ok_or_else(|| CacheError::Backend(format!("malformed cache key '{key}'")))?;

        tracing::debug!(key, "pulling into cache from object store");
        let payload = self.store.download(bucket, object).await?;

        let expires_at = if self.ttl.is_zero() {
            None
        } else {
            Some(SystemTime::now() + self.ttl)
        };
        tracing::debug!(key, bytes = payload.len(), "pulled into cache");
        Ok(ByteView::new(payload, expires_at))
    }
}
