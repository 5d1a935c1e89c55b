//! # Metrics Exporter
//!
//! Prometheus gauges mirroring the engine's counters, served from the
//! dedicated metrics listener. Gauges are refreshed from a stats snapshot at
//! scrape time, so the exporter never races the engine.

use std::sync::Arc;

use axum::http::header;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use blobcache_common::{CacheError, CacheResult};
use blobcache_engine::{Cache, StatsSnapshot, StoreStats};

pub struct CacheMetrics {
    registry: Registry,
    gets: IntGauge,
    hits: IntGauge,
    peers_get_highest_latency: IntGauge,
    peer_loads: IntGauge,
    peer_errors: IntGauge,
    loads: IntGauge,
    loads_deduped: IntGauge,
    local_loads: IntGauge,
    local_load_errors: IntGauge,
    server_requests: IntGauge,
    cache_bytes: IntGaugeVec,
    cache_items: IntGaugeVec,
    cache_gets: IntGaugeVec,
    cache_hits: IntGaugeVec,
    cache_evictions: IntGaugeVec,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> CacheResult<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))
        .map_err(|err| CacheError::Config(format!("metric {name}: {err}")))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|err| CacheError::Config(format!("metric {name}: {err}")))?;
    Ok(gauge)
}

fn gauge_vec(registry: &Registry, name: &str, help: &str) -> CacheResult<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), &["type"])
        .map_err(|err| CacheError::Config(format!("metric {name}: {err}")))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|err| CacheError::Config(format!("metric {name}: {err}")))?;
    Ok(gauge)
}

impl CacheMetrics {
    pub fn new() -> CacheResult<Self> {
        let registry = Registry::new();
        Ok(CacheMetrics {
            gets: gauge(&registry, "blobcache_gets_total", "Total number of get requests")?,
            hits: gauge(
                &registry,
                "blobcache_hits_total",
                "Total number of both main and hot cache hits",
            )?,
            peers_get_highest_latency: gauge(
                &registry,
                "blobcache_peers_get_highest_latency_ms",
                "Highest observed latency of a peer get",
            )?,
            peer_loads: gauge(
                &registry,
                "blobcache_peer_loads_total",
                "Total number of remote loads or remote cache hits",
            )?,
            peer_errors: gauge(
                &registry,
                "blobcache_peer_errors_total",
                "Total number of peer errors",
            )?,
            loads: gauge(
                &registry,
                "blobcache_loads_total",
                "Total number of both local and remote cache loads",
            )?,
            loads_deduped: gauge(
                &registry,
                "blobcache_loads_deduped_total",
                "Total number of deduplicated cache loads",
            )?,
            local_loads: gauge(
                &registry,
                "blobcache_local_loads_total",
                "Total number of local cache loads",
            )?,
            local_load_errors: gauge(
                &registry,
                "blobcache_local_load_errors_total",
                "Total number of local cache load errors",
            )?,
            server_requests: gauge(
                &registry,
                "blobcache_server_requests_total",
                "Total number of gets from other peers",
            )?,
            cache_bytes: gauge_vec(
                &registry,
                "blobcache_cache_bytes",
                "Current (main/hot) cache bytes",
            )?,
            cache_items: gauge_vec(
                &registry,
                "blobcache_cache_items",
                "Current (main/hot) cache items",
            )?,
            cache_gets: gauge_vec(
                &registry,
                "blobcache_cache_gets_total",
                "Total number of (main/hot) cache get requests",
            )?,
            cache_hits: gauge_vec(
                &registry,
                "blobcache_cache_hits_total",
                "Total number of (main/hot) cache hits",
            )?,
            cache_evictions: gauge_vec(
                &registry,
                "blobcache_cache_evictions_total",
                "Total number of (main/hot) cache evictions",
            )?,
            registry,
        })
    }

    pub fn update(&self, snapshot: &StatsSnapshot) {
        self.gets.set(snapshot.gets as i64);
        self.hits.set(snapshot.cache_hits as i64);
        self.peers_get_highest_latency
            .set(snapshot.peer_get_max_latency_ms as i64);
        self.peer_loads.set(snapshot.peer_loads as i64);
        self.peer_errors.set(snapshot.peer_errors as i64);
        self.loads.set(snapshot.loads as i64);
        self.loads_deduped.set(snapshot.loads_deduped as i64);
        self.local_loads.set(snapshot.local_loads as i64);
        self.local_load_errors.set(snapshot.local_load_errs as i64);
        self.server_requests.set(snapshot.server_requests as i64);

        let tiers: [(&str, StoreStats); 2] = [("main", snapshot.main), ("hot", snapshot.hot)];
        for (tier, stats) in tiers {
            self.cache_bytes
                .with_label_values(&[tier])
                .set(stats.bytes as i64);
            self.cache_items
                .with_label_values(&[tier])
                .set(stats.items as i64);
            self.cache_gets
                .with_label_values(&[tier])
                .set(stats.gets as i64);
            self.cache_hits
                .with_label_values(&[tier])
                .set(stats.hits as i64);
            self.cache_evictions
                .with_label_values(&[tier])
                .set(stats.evictions as i64);
        }
    }

    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Builds the `/metrics` router for the dedicated listener.
pub fn router(cache: Cache) -> CacheResult<Router> {
    let metrics = Arc::new(CacheMetrics::new()?);
    let handler = move || {
        let metrics = Arc::clone(&metrics);
        let cache = cache.clone();
        async move {
            metrics.update(&cache.stats());
            (
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                metrics.render(),
            )
        }
    };
    Ok(Router::new().route("/metrics", get(handler)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_track_a_snapshot() {
        let metrics = CacheMetrics::new().unwrap();
        let snapshot = StatsSnapshot {
            gets: 7,
            cache_hits: 3,
            loads: 4,
            loads_deduped: 1,
            local_loads: 2,
            main: StoreStats {
                bytes: 1024,
                items: 2,
                gets: 7,
                hits: 3,
                evictions: 1,
            },
            ..Default::default()
        };
        metrics.update(&snapshot);

        let rendered = metrics.render();
        assert!(rendered.contains("blobcache_gets_total 7"));
        assert!(rendered.contains("blobcache_hits_total 3"));
        assert!(rendered.contains("blobcache_cache_bytes{type=\"main\"} 1024"));
        assert!(rendered.contains("blobcache_cache_items{type=\"hot\"} 0"));
    }
}
