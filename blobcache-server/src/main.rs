use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use blobcache_client::PeerClient;
use blobcache_engine::{Cache, Group, PeerResolver};
use blobcache_s3::BlobStore;

use blobcache_server::config::Options;
use blobcache_server::filler::S3Filler;
use blobcache_server::{app, auth::TokenVerifier, metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    init_logging(options.verbose);

    options.validate().context("invalid configuration")?;
    let peers = options.peer_list();

    let store = Arc::new(BlobStore::connect(options.s3_endpoint.as_deref()).await);

    let resolver = Arc::new(PeerResolver::new(options.self_url()));
    if !peers.is_empty() {
        resolver.set_peers(&peers);
        tracing::info!(?peers, self_url = %options.self_url(), "peer ring configured");
    }
    let transport = Arc::new(PeerClient::new(options.get_timeout())?);
    let filler = Arc::new(S3Filler::new(Arc::clone(&store), options.ttl_duration()));

    let group = Group::builder("s3", filler)
        .max_bytes(options.max_cache_bytes())
        .resolver(resolver)
        .transport(transport)
        .build();
    let cache = Cache::new(group, options.get_timeout());

    let auth = match &options.jwt_rsa_public_key {
        Some(path) => {
            tracing::info!(path = %path.display(), "bearer-token auth enabled");
            Some(Arc::new(TokenVerifier::from_pem_file(path)?))
        }
        None => None,
    };

    let state = AppState {
        cache: cache.clone(),
        store,
        auth,
        max_multipart_bytes: options.max_multipart_bytes(),
    };

    let metrics_addr = format!("0.0.0.0:{}", options.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("binding metrics listener on {metrics_addr}"))?;
    let metrics_router = metrics::router(cache)?;
    tokio::spawn(async move {
        tracing::info!(%metrics_addr, "prometheus metrics listening at /metrics");
        if let Err(err) = axum::serve(metrics_listener, metrics_router).await {
            tracing::error!(error = %err, "metrics server failed");
        }
    });

    let addr = format!("0.0.0.0:{}", options.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding http listener on {addr}"))?;
    tracing::info!(%addr, "http server is ready to handle requests");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("http server stopped");
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("http server is shutting down");
}
