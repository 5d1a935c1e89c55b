//! Command-line options and startup validation.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use blobcache_common::{CacheError, CacheResult};

/// Distributed in-memory read-through cache for S3-compatible object stores.
#[derive(Parser, Debug, Clone)]
#[command(name = "blobcache", version, about)]
pub struct Options {
    /// Host/IP to identify self in the peers list
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Prometheus metrics port
    #[arg(long, default_value_t = 9095)]
    pub metrics_port: u16,

    /// Custom S3 endpoint URL (defaults to AWS)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Max memory in megabytes for /upload multipart form parsing
    #[arg(long, default_value_t = 128)]
    pub max_multipart_memory: u64,

    /// Max cache size in megabytes; oldest keys are evicted above it
    #[arg(long, default_value_t = 512)]
    pub max_cache_size: u64,

    /// Blob time-to-live in cache in minutes; 0 never expires
    #[arg(long, default_value_t = 60)]
    pub ttl: u64,

    /// Get blob timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub timeout: u64,

    /// Peers, e.g. 'http://peer1:8080,http://peer2:8080'
    #[arg(long, default_value = "")]
    pub peers: String,

    /// Path to an RSA public key PEM; enables bearer-token auth when set
    #[arg(long)]
    pub jwt_rsa_public_key: Option<PathBuf>,

    /// Verbose logs
    #[arg(long)]
    pub verbose: bool,
}

impl Options {
    /// The base URL this node identifies itself with on the peer ring.
    pub fn self_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// The cleaned peer list; empty when running single-node.
    pub fn peer_list(&self) -> Vec<String> {
        cleanup_peers(&self.peers, self.port)
    }

    /// Fill-side expiry; zero means entries never expire.
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl * 60)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn max_cache_bytes(&self) -> u64 {
        self.max_cache_size << 20
    }

    pub fn max_multipart_bytes(&self) -> usize {
        (self.max_multipart_memory << 20) as usize
    }

    /// Fatal misconfiguration checks, run once at startup.
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_cache_size == 0 {
            return Err(CacheError::Config(
                "max-cache-size must be greater than zero".to_string(),
            ));
        }

        let peers = self.peer_list();
        if !peers.is_empty() && !peers.contains(&self.self_url()) {
            return Err(CacheError::Config(format!(
                "peers list does not contain self ({}); keys could never resolve locally",
                self.self_url()
            )));
        }
        Ok(())
    }
}

/// Normalizes a comma-separated peer flag into base URLs.
///
/// Each entry is trimmed, given an `http://` scheme when missing, and given
/// the default port when none is present.
pub fn cleanup_peers(raw: &str, default_port: u16) -> Vec<String> {
    let mut cleaned = Vec::new();
    for peer in raw.split(',') {
        let peer = peer.trim();
        if peer.is_empty() {
            continue;
        }
        let mut peer = peer.to_string();
        if !peer.contains("http://") {
            peer = format!("http://{peer}");
        }
        if peer.matches(':').count() < 2 {
            peer = format!("{peer}:{default_port}");
        }
        cleaned.push(peer);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(peers: &str) -> Options {
        Options {
            host: "localhost".to_string(),
            port: 8080,
            metrics_port: 9095,
            s3_endpoint: None,
            max_multipart_memory: 128,
            max_cache_size: 512,
            ttl: 60,
            timeout: 5000,
            peers: peers.to_string(),
            jwt_rsa_public_key: None,
            verbose: false,
        }
    }

    #[test]
    fn cleanup_fills_in_scheme_and_port() {
        let peers = cleanup_peers(" peer1 ,http://peer2, peer3:9000 ,", 8080);
        assert_eq!(
            peers,
            vec![
                "http://peer1:8080".to_string(),
                "http://peer2:8080".to_string(),
                "http://peer3:9000".to_string(),
            ]
        );
    }

    #[test]
    fn cleanup_of_empty_flag_is_empty() {
        assert!(cleanup_peers("", 8080).is_empty());
        assert!(cleanup_peers(" , ,", 8080).is_empty());
    }

    #[test]
    fn validate_accepts_single_node() {
        assert!(options("").validate().is_ok());
    }

    #[test]
    fn validate_requires_self_in_peer_list() {
        let ok = options("localhost:8080,otherhost:8080");
        assert!(ok.validate().is_ok());

        let missing_self = options("otherhost:8080,thirdhost:8080");
        assert!(matches!(
            missing_self.validate(),
            Err(CacheError::Config(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut opts = options("");
        opts.max_cache_size = 0;
        assert!(matches!(opts.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn derived_sizes() {
        let opts = options("");
        assert_eq!(opts.max_cache_bytes(), 512 << 20);
        assert_eq!(opts.ttl_duration(), Duration::from_secs(3600));
        assert_eq!(opts.self_url(), "http://localhost:8080");
    }
}
