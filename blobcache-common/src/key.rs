//! Cache-key composition.
//!
//! The REST layer addresses blobs as `(bucket, object)` pairs while the
//! engine only ever sees one opaque string. The two are joined with `#`,
//! which is forbidden inside bucket names, so the owning side can split the
//! key back apart without ambiguity.

use crate::error::{CacheError, CacheResult};

/// Separator between the bucket and object halves of a cache key.
pub const KEY_SEPARATOR: char = '#';

/// Joins a bucket and object key into the engine's cache key.
///
/// The bucket must be non-empty and must not contain the separator; the
/// object key must be non-empty. Surrounding whitespace is trimmed.
pub fn compose_key(bucket: &str, object: &str) -> CacheResult<String> {
    let bucket = bucket.trim();
    let object = object.trim();

    if bucket.is_empty() {
        return Err(CacheError::Config("bucket must not be empty".to_string()));
    }
    if bucket.contains(KEY_SEPARATOR) {
        return Err(CacheError::Config(format!(
            "bucket must not contain '{KEY_SEPARATOR}'"
        )));
    }
    if object.is_empty() {
        return Err(CacheError::Config("object key must not be empty".to_string()));
    }

    Ok(format!("{bucket}{KEY_SEPARATOR}{object}"))
}

/// Splits a cache key back into its `(bucket, object)` halves.
///
/// Returns `None` for keys that were not produced by [`compose_key`].
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (bucket, object) = key.split_once(KEY_SEPARATOR)?;
    if bucket.is_empty() || object.is_empty() {
        return None;
    }
    Some((bucket, object))
}
