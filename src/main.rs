use anyhow::{Context, Result};
use artifact_proxy::{
    AppState,
    config::{AppConfig, StoreKind},
    services::{
        auth_gate::AuthGate, bucket_store::BucketStore, disk_store::DiskStore,
        memory_store::MemoryStore,
        object_store::ObjectStore, origin_fetcher::OriginFetcher, resolver::Resolver,
    },
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    // RUST_LOG wins; otherwise DEBUG picks between info and debug.
    let default_level = if cfg.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!("Starting artifact-proxy with config: {:?}", cfg);
    let gate = AuthGate::new(cfg.credentials.clone());
    if gate.is_enabled() {
        tracing::info!("Basic auth enabled for users: {:?}", gate.users());
    } else {
        tracing::warn!("BASICAUTH not set, serving without authentication");
    }
    if cfg.upstream.is_none() {
        tracing::warn!("UPSTREAM not set, cache misses will return 404");
    }

    // --- Initialize object store ---
    let store: Arc<dyn ObjectStore> = match cfg.store {
        StoreKind::Disk => {
            let bucket = cfg
                .bucket
                .clone()
                .context("BUCKET must be set for the disk store")?;
            let disk = DiskStore::new(&cfg.storage_dir, bucket);
            disk.ensure_root()
                .await
                .with_context(|| format!("creating bucket directory under {}", cfg.storage_dir))?;
            tracing::info!("Serving cache from {}", disk.base_path.join(&disk.bucket).display());
            Arc::new(disk)
        }
        StoreKind::Gcs => {
            let bucket = cfg
                .bucket
                .as_deref()
                .context("BUCKET must be set for the gcs store")?;
            let gcs = BucketStore::gcs(bucket, cfg.store_credentials.as_ref())
                .with_context(|| format!("connecting to bucket {}", bucket))?;
            tracing::info!("Serving cache from gs://{}", bucket);
            Arc::new(gcs)
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store, cached objects are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Initialize upstream + pipeline ---
    let client = reqwest::Client::builder()
        .build()
        .context("building upstream HTTP client")?;
    let origin = OriginFetcher::new(client, cfg.upstream.clone());
    let resolver = Resolver::new(store, origin);

    let shutdown = CancellationToken::new();
    let state = AppState::new(resolver, gate, shutdown.clone());

    // --- Build router ---
    let app = artifact_proxy::app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, cancelling every open request token.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
