//! Embed relay process entry point
//!
//! - Runs a pool of Discord shards feeding an in-memory cache
//! - Relays guild and channel events to socket.io rooms over Redis pub/sub
//! - Exposes health/ready endpoints and Prometheus metrics

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use embed_relay::broadcast::RedisBroadcaster;
use embed_relay::config::GatewayConfig;
use embed_relay::events::{build_cache, RoomPublisher};
use embed_relay::health::{self, AppState};
use embed_relay::metrics::GatewayMetrics;
use embed_relay::shard::ShardPool;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let config = GatewayConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("embed_relay={}", config.log_level).parse()?)
                .add_directive("twilight_gateway=info".parse()?)
                .add_directive("redis=warn".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pool_id = config.pool_id,
        total_shards = config.total_shards,
        "Starting embed relay"
    );

    let metrics = Arc::new(GatewayMetrics::new()?);
    info!("Prometheus metrics initialized");

    let broadcaster = if let Some(ref url) = config.broadcast_url {
        match RedisBroadcaster::connect(url, config.broadcast_channel.clone()).await {
            Ok(broadcaster) => {
                info!(%url, channel = %config.broadcast_channel, "Connected to broadcast service");
                metrics.set_broadcast_connected(true);
                Some(broadcaster)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to broadcast service - running in local mode");
                metrics.set_broadcast_connected(false);
                None
            }
        }
    } else {
        info!("No REDIS_URL configured - running in local mode");
        None
    };

    let publisher = broadcaster
        .clone()
        .map(|broadcaster| Arc::new(RoomPublisher::new(broadcaster)));

    let cache = Arc::new(build_cache(config.message_cache_size));

    let intents = GatewayConfig::intents();
    info!(?intents, "Using Discord intents");

    let pool = ShardPool::new(
        config.pool_id,
        config.total_shards,
        config.discord_token.clone(),
        intents,
        cache,
        publisher,
        Arc::clone(&metrics),
    )?;

    let pool_state = pool.state();
    info!(
        pool_id = config.pool_id,
        shard_count = pool_state.shard_count(),
        "Shard pool created"
    );

    let app_state = AppState {
        shard_state: pool_state,
        broadcaster: broadcaster.clone(),
        metrics: Arc::clone(&metrics),
    };

    let addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    info!(port = config.http_port, "Starting HTTP server");

    let http_server = axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        health::router(app_state),
    );

    let shutdown = pool.shutdown_handle();
    let mut pool_task = tokio::spawn(pool.run());

    tokio::select! {
        result = &mut pool_task => {
            match result {
                Ok(Err(e)) => error!(error = %e, "Shard pool error"),
                Err(e) => error!(error = %e, "Shard pool task panicked"),
                Ok(Ok(())) => {}
            }
        }
        result = http_server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Shutting down relay...");

    // Stop every shard, then wait for in-flight dispatches to drain
    shutdown.shutdown();
    if !pool_task.is_finished() {
        if let Err(e) = pool_task.await {
            error!(error = %e, "Shard pool task panicked during shutdown");
        }
    }

    if let Some(ref broadcaster) = broadcaster {
        broadcaster.close();
    }

    info!("Relay shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
}
