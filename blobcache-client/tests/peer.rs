use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;

use blobcache_common::protocol::EXPIRE_HEADER;
use blobcache_common::CacheError;
use blobcache_client::PeerClient;
use blobcache_engine::PeerTransport;

/// Serves `app` on an ephemeral port and returns the peer base URL.
async fn spawn_peer(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

fn client() -> PeerClient {
    PeerClient::new(Duration::from_secs(2)).expect("client")
}

#[tokio::test]
async fn fetch_decodes_body_and_expiry() {
    let app = Router::new().route(
        "/_cache/:group/*key",
        get(|Path((group, key)): Path<(String, String)>| async move {
            assert_eq!(group, "s3");
            assert_eq!(key, "bucket#dir/blob name.bin");
            (
                StatusCode::OK,
                [
                    (EXPIRE_HEADER, "1700000000123"),
                    ("content-type", "application/octet-stream"),
                ],
                Bytes::from_static(b"blob-bytes"),
            )
        }),
    );
    let peer = spawn_peer(app).await;

    let view = client()
        .fetch(&peer, "s3", "bucket#dir/blob name.bin")
        .await
        .expect("fetch");
    assert_eq!(view.payload().as_ref(), b"blob-bytes");
    assert!(view.expires_at().is_some());
}

#[tokio::test]
async fn fetch_without_expiry_header_never_expires() {
    let app = Router::new().route(
        "/_cache/:group/*key",
        get(|| async { (StatusCode::OK, Bytes::from_static(b"x")) }),
    );
    let peer = spawn_peer(app).await;

    let view = client().fetch(&peer, "s3", "k").await.expect("fetch");
    assert_eq!(view.expires_at(), None);
}

#[tokio::test]
async fn fetch_maps_404_to_not_found() {
    let app = Router::new().route(
        "/_cache/:group/*key",
        get(|| async { StatusCode::NOT_FOUND }),
    );
    let peer = spawn_peer(app).await;

    let err = client().fetch(&peer, "s3", "missing").await.unwrap_err();
    assert_eq!(err, CacheError::NotFound);
}

#[tokio::test]
async fn fetch_maps_5xx_to_peer_error() {
    let app = Router::new().route(
        "/_cache/:group/*key",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let peer = spawn_peer(app).await;

    let err = client().fetch(&peer, "s3", "k").await.unwrap_err();
    assert!(matches!(err, CacheError::Peer(_)));
}

#[tokio::test]
async fn fetch_maps_connection_refused_to_peer_error() {
    let err = client()
        .fetch("http://127.0.0.1:1", "s3", "k")
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Peer(_)));
}

#[tokio::test]
async fn remove_accepts_200_and_404() {
    let app = Router::new().route(
        "/_cache/:group/*key",
        get(|| async { StatusCode::OK }).delete(|Path((_, key)): Path<(String, String)>| async move {
            if key == "present" {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            }
        }),
    );
    let peer = spawn_peer(app).await;

    let peer_client = client();
    peer_client.remove(&peer, "s3", "present").await.expect("200");
    peer_client.remove(&peer, "s3", "absent").await.expect("404");
}

#[tokio::test]
async fn remove_rejects_5xx() {
    let app = Router::new().route(
        "/_cache/:group/*key",
        get(|| async { StatusCode::OK })
            .delete(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let peer = spawn_peer(app).await;

    let err = client().remove(&peer, "s3", "k").await.unwrap_err();
    assert!(matches!(err, CacheError::Peer(_)));
}
