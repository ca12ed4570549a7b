//! Covey Router - edge load balancer for the frontend pool
//!
//! A standalone process: discovers frontend instances through their DNS
//! alias, health-checks them on a timer, and round-robins incoming
//! traffic across the healthy ones.

mod config;
mod pool;
mod proxy;

use clap::Parser;
use config::RouterConfig;
use pool::EndpointPool;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Covey Router CLI arguments
#[derive(Parser, Debug)]
#[command(name = "covey-router")]
#[command(about = "Covey edge load-balancing router", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "covey_router=debug,tower_http=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "covey_router=info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RouterConfig::from_env();
    info!("Router configuration:");
    info!("  service name: {}", config.service_name);
    info!("  service port: {}", config.service_port);
    info!("  health path:  {}", config.health_path);
    info!("  router port:  {}", config.listen_port);

    let pool = EndpointPool::new(config.clone())?;

    // One discovery + health pass before taking traffic, so the first
    // requests do not all land on 503
    pool.discover().await;
    pool.check_health().await;
    std::sync::Arc::clone(&pool).spawn_loops();

    let app = axum::Router::new()
        .route("/router/status", axum::routing::get(proxy::status))
        .route("/router/health", axum::routing::get(proxy::health))
        .fallback(proxy::proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(pool);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Router listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
