//! # REST Surface
//!
//! User-facing handlers, kept thin: each one validates its querystring,
//! composes a cache key, and hands off to the façade or the object store.

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use blobcache_common::key::compose_key;
use blobcache_common::CacheError;

use crate::AppState;

/// Parallelism cap for upload and prewarm fan-out against the backend.
const POOL_WORKERS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct BlobParams {
    bucket: Option<String>,
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    bucket: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrewarmParams {
    bucket: Option<String>,
    keys: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    bucket: Option<String>,
    prefix: Option<String>,
}

/// Extracts a required, non-blank querystring parameter.
fn required(value: Option<&str>, name: &str) -> Result<String, Response> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err((
            StatusCode::BAD_REQUEST,
            format!("'{name}' not found in querystring parameters"),
        )
            .into_response()),
    }
}

fn cache_key(bucket: &str, object: &str) -> Result<String, Response> {
    compose_key(bucket, object)
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()).into_response())
}

/// `GET /get?bucket=&key=` — read-through fetch.
pub async fn get_blob(
    State(state): State<AppState>,
    Query(params): Query<BlobParams>,
) -> Response {
    let (bucket, object) = match (
        required(params.bucket.as_deref(), "bucket"),
        required(params.key.as_deref(), "key"),
    ) {
        (Ok(bucket), Ok(object)) => (bucket, object),
        (Err(response), _) | (_, Err(response)) => return response,
    };
    let key = match cache_key(&bucket, &object) {
        Ok(key) => key,
        Err(response) => return response,
    };

    tracing::debug!(key, "checking cache");
    match state.cache.get(&key).await {
        Ok(payload) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE.as_str(), "application/octet-stream".to_string()),
                (
                    header::CONTENT_DISPOSITION.as_str(),
                    format!("attachment; filename=\"{object}\""),
                ),
            ],
            payload,
        )
            .into_response(),
        Err(CacheError::NotFound) => (StatusCode::NOT_FOUND, "Blob not found").into_response(),
        Err(CacheError::DeadlineExceeded) => {
            (StatusCode::GATEWAY_TIMEOUT, "Timed out getting blob").into_response()
        }
        Err(err) => {
            tracing::error!(key, error = %err, "get failed");
            (StatusCode::BAD_GATEWAY, "Failed to get blob from backend").into_response()
        }
    }
}

/// `POST /upload?bucket=&path=` — multipart upload fanned out over a bounded
/// worker pool.
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut form: Multipart,
) -> Response {
    let bucket = match required(params.bucket.as_deref(), "bucket") {
        Ok(bucket) => bucket,
        Err(response) => return response,
    };
    let mut path = params.path.unwrap_or_default().trim().to_string();
    if !path.is_empty() && !path.ends_with('/') {
        path.push('/');
    }

    let mut files: Vec<(String, Bytes)> = Vec::new();
    loop {
        match form.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("files") {
                    continue;
                }
                let name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(data) => files.push((name, data)),
                    Err(err) => {
                        tracing::error!(error = %err, "failed to read multipart field");
                        return (StatusCode::BAD_REQUEST, "Expecting a multipart form")
                            .into_response();
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "failed to parse multipart form");
                return (StatusCode::BAD_REQUEST, "Expecting a multipart form").into_response();
            }
        }
    }
    if files.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "'files' not found in multipart form",
        )
            .into_response();
    }

    let uploaded = files.len();
    let limiter = Arc::new(Semaphore::new(POOL_WORKERS));
    let mut pool = JoinSet::new();
    for (name, data) in files {
        let limiter = Arc::clone(&limiter);
        let store = Arc::clone(&state.store);
        let bucket = bucket.clone();
        let object = format!("{path}{name}");
        pool.spawn(async move {
            let Ok(_permit) = limiter.acquire_owned().await else {
                return Err(CacheError::Backend("upload pool closed".to_string()));
            };
            tracing::debug!(bucket, object, "uploading to object store");
            store.upload(&bucket, &object, data).await
        });
    }

    let mut failures = 0usize;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                failures += 1;
                tracing::error!(error = %err, "upload failed");
            }
            Err(err) => {
                failures += 1;
                tracing::error!(error = %err, "upload task panicked");
            }
        }
    }

    if failures > 0 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error, check server logs")
            .into_response();
    }
    (
        StatusCode::OK,
        format!("Uploaded {uploaded} object(s) to S3"),
    )
        .into_response()
}

/// `POST /prewarm?bucket=&keys=a,b,c` — pull a key list through the cache in
/// the background, at most [`POOL_WORKERS`] fetches at a time.
pub async fn prewarm(
    State(state): State<AppState>,
    Query(params): Query<PrewarmParams>,
) -> Response {
    let bucket = match required(params.bucket.as_deref(), "bucket") {
        Ok(bucket) => bucket,
        Err(response) => return response,
    };
    let raw_keys = match required(params.keys.as_deref(), "keys") {
        Ok(keys) => keys,
        Err(response) => return response,
    };

    let mut keys = Vec::new();
    for object in raw_keys.split(',') {
        let object = object.trim();
        if object.is_empty() {
            continue;
        }
        match cache_key(&bucket, object) {
            Ok(key) => keys.push(key),
            Err(response) => return response,
        }
    }
    if keys.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "'keys' not found in querystring parameters",
        )
            .into_response();
    }

    let count = keys.len();
    let cache = state.cache.clone();
    tokio::spawn(async move {
        let limiter = Arc::new(Semaphore::new(POOL_WORKERS));
        let mut pool = JoinSet::new();
        for key in keys {
            let limiter = Arc::clone(&limiter);
            let cache = cache.clone();
            pool.spawn(async move {
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return;
                };
                match cache.get(&key).await {
                    Ok(payload) => {
                        tracing::debug!(key, bytes = payload.len(), "prewarmed");
                    }
                    Err(err) => {
                        tracing::warn!(key, error = %err, "prewarm fetch failed");
                    }
                }
            });
        }
        while pool.join_next().await.is_some() {}
        tracing::debug!("prewarm campaign finished");
    });

    (
        StatusCode::ACCEPTED,
        format!("Prewarming {count} object(s)"),
    )
        .into_response()
}

/// `POST /invalidate?bucket=&key=` — drop the cached copy everywhere that
/// matters: locally and, best-effort, on the owner.
pub async fn invalidate(
    State(state): State<AppState>,
    Query(params): Query<BlobParams>,
) -> Response {
    let (bucket, object) = match (
        required(params.bucket.as_deref(), "bucket"),
        required(params.key.as_deref(), "key"),
    ) {
        (Ok(bucket), Ok(object)) => (bucket, object),
        (Err(response), _) | (_, Err(response)) => return response,
    };
    let key = match cache_key(&bucket, &object) {
        Ok(key) => key,
        Err(response) => return response,
    };

    state.cache.remove(&key);
    let message = format!("'{key}' invalidated from cache");
    tracing::debug!("{message}");
    (StatusCode::OK, message).into_response()
}

/// `GET /list?bucket=&prefix=` — object keys straight from the backend.
pub async fn list(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    let bucket = match required(params.bucket.as_deref(), "bucket") {
        Ok(bucket) => bucket,
        Err(response) => return response,
    };

    match state.store.list(&bucket, params.prefix.as_deref()).await {
        Ok(keys) => Json(keys).into_response(),
        Err(err) => {
            tracing::error!(bucket, error = %err, "list failed");
            (StatusCode::BAD_GATEWAY, "Failed to list bucket").into_response()
        }
    }
}

/// `DELETE /delete?bucket=&key=` — remove from the backend, then invalidate
/// the cached copy.
pub async fn delete_blob(
    State(state): State<AppState>,
    Query(params): Query<BlobParams>,
) -> Response {
    let (bucket, object) = match (
        required(params.bucket.as_deref(), "bucket"),
        required(params.key.as_deref(), "key"),
    ) {
        (Ok(bucket), Ok(object)) => (bucket, object),
        (Err(response), _) | (_, Err(response)) => return response,
    };
    let key = match cache_key(&bucket, &object) {
        Ok(key) => key,
        Err(response) => return response,
    };

    if let Err(err) = state.store.delete(&bucket, &object).await {
        tracing::error!(key, error = %err, "delete failed");
        return (StatusCode::BAD_GATEWAY, "Failed to delete blob from backend").into_response();
    }
    state.cache.remove(&key);
    (StatusCode::OK, format!("'{key}' deleted")).into_response()
}
