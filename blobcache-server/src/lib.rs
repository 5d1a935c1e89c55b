//! # Cache Node Server
//!
//! Assemble the HTTP surface of one blobcache node: the user-facing REST
//! routes, the reserved peer RPC prefix, and the prometheus exporter, all
//! over one explicit [`AppState`] handle built at startup.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use blobcache_engine::Cache;
use blobcache_s3::BlobStore;

pub mod auth;
pub mod config;
pub mod filler;
pub mod http;
pub mod metrics;
pub mod peer;

/// Everything the handlers need, built once in `main` and cloned per router.
#[derive(Clone)]
pub struct AppState {
    pub cache: Cache,
    pub store: Arc<BlobStore>,
    pub auth: Option<Arc<auth::TokenVerifier>>,
    pub max_multipart_bytes: usize,
}

/// Builds the node's main router: REST surface plus peer RPC.
///
/// `/healthz` and the `/_cache` prefix stay outside the auth middleware;
/// peers authenticate with membership, not tokens.
pub fn app(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/get", get(http::get_blob))
        .route("/upload", post(http::upload))
        .route("/prewarm", post(http::prewarm))
        .route("/invalidate", post(http::invalidate))
        .route("/list", get(http::list))
        .route("/delete", delete(http::delete_blob))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(DefaultBodyLimit::max(state.max_multipart_bytes));

    Router::new()
        .merge(user_routes)
        .route("/healthz", get(|| async { "UP" }))
        .route(
            "/_cache/:group/*key",
            get(peer::peer_get).delete(peer::peer_remove),
        )
        .with_state(state)
}
