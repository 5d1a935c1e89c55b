//! HTTP implementation of the engine's peer transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use blobcache_common::protocol::{decode_expiry, peer_path, EXPIRE_HEADER};
use blobcache_common::{CacheError, CacheResult};
use blobcache_engine::{ByteView, PeerTransport};

/// Peer RPC client over a pooled `reqwest` connection.
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    /// Builds a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> CacheResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CacheError::Config(format!("peer http client: {err}")))?;
        Ok(PeerClient { http })
    }

    fn url(peer: &str, group: &str, key: &str) -> String {
        format!("{}{}", peer.trim_end_matches('/'), peer_path(group, key))
    }
}

#[async_trait]
impl PeerTransport for PeerClient {
    async fn fetch(&self, peer: &str, group: &str, key: &str) -> CacheResult<ByteView> {
        let url = Self::url(peer, group, key);
        tracing::debug!(%url, "fetching from peer");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| CacheError::Peer(err.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let expire_millis = match response.headers().get(EXPIRE_HEADER) {
                    Some(value) => value
                        .to_str()
                        .ok()
                        .and_then(|text| text.parse::<u64>().ok())
                        .ok_or_else(|| {
                            CacheError::Peer(format!("peer sent invalid {EXPIRE_HEADER} header"))
                        })?,
                    None => 0,
                };
                let payload = response
                    .bytes()
                    .await
                    .map_err(|err| CacheError::Peer(err.to_string()))?;
                Ok(ByteView::new(payload, decode_expiry(expire_millis)))
            }
            StatusCode::NOT_FOUND => Err(CacheError::NotFound),
            status => Err(CacheError::Peer(format!("peer returned {status}"))),
        }
    }

    async fn remove(&self, peer: &str, group: &str, key: &str) -> CacheResult<()> {
        let url = Self::url(peer, group, key);
        tracing::debug!(%url, "invalidating on peer");

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|err| CacheError::Peer(err.to_string()))?;

        // 404 means the peer never held the entry; that is still "gone".
        match response.status() {
            StatusCode::OK | StatusCode::NOT_FOUND => Ok(()),
            status => Err(CacheError::Peer(format!("peer returned {status}"))),
        }
    }
}
