//! # Peer RPC Server
//!
//! The node side of the `/_cache/<group>/<key>` prefix. GET serves a blob
//! (filling it if this node owns the key); DELETE drops the local copy only,
//! so invalidations never echo back and forth between nodes.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use blobcache_common::protocol::{encode_expiry, EXPIRE_HEADER};
use blobcache_common::CacheError;

use crate::AppState;

/// `GET /_cache/:group/*key`
pub async fn peer_get(
    State(state): State<AppState>,
    Path((group, key)): Path<(String, String)>,
) -> Response {
    if group != state.cache.group().name() {
        return (StatusCode::NOT_FOUND, "unknown group").into_response();
    }

    match state.cache.group().peer_get(&key).await {
        Ok(view) => (
            StatusCode::OK,
            [
                (EXPIRE_HEADER, encode_expiry(view.expires_at()).to_string()),
                (
                    header::CONTENT_TYPE.as_str(),
                    "application/octet-stream".to_string(),
                ),
            ],
            view.into_payload(),
        )
            .into_response(),
        Err(CacheError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::warn!(key, error = %err, "peer get failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// `DELETE /_cache/:group/*key`
pub async fn peer_remove(
    State(state): State<AppState>,
    Path((group, key)): Path<(String, String)>,
) -> Response {
    if group != state.cache.group().name() {
        return (StatusCode::NOT_FOUND, "unknown group").into_response();
    }

    state.cache.group().remove_local(&key);
    StatusCode::OK.into_response()
}
