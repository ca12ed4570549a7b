//! Covey Server binary
//!
//! Startup order matters: the store must open before anything else (a
//! node without its store is useless), discovery and one election pass
//! run before the listener starts, and a follower pulls its first
//! snapshot before the readiness gate would let traffic through.

use anyhow::Context;
use clap::Parser;
use covey_core::cluster::Replicator;
use covey_core::{Cluster, TableStore};
use covey_server::AppState;
use covey_server::config::ServerConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Covey Server CLI arguments
#[derive(Parser, Debug)]
#[command(name = "covey-server")]
#[command(about = "Covey cluster-coordinated application server", long_about = None)]
struct Args {
    /// Enable verbose logging (prints debug information to stdout/stderr)
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "covey_server=debug,covey_core=debug,tower_http=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "covey_server=info,covey_core=info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    // Fatal: there is no degraded mode without a local store
    let store = Arc::new(
        TableStore::open(&config.cluster.data_dir, config.cluster.map_size)
            .context("opening the local store")?,
    );

    let cluster = Cluster::new(config.cluster.clone(), Arc::clone(&store))?;

    if let Err(e) = cluster.discover_peers().await {
        warn!("Initial node discovery failed: {}", e);
    }
    cluster.elect_leader().await;
    cluster.spawn_election_loop();

    // From here on, every committed local write is offered to replication
    store.add_observer(Arc::new(Replicator::new(Arc::clone(&cluster))));

    if !cluster.is_primary() && cluster.primary_address().is_some() {
        info!("This node is a replica; requesting full sync from the primary");
        if let Err(e) = cluster.request_full_sync().await {
            warn!(
                "Initial sync from primary failed: {}. Node stays gated until a resync succeeds",
                e
            );
        }
    }
    if cluster.is_primary() {
        cluster.set_ready(true);
    }

    let state = AppState {
        cluster: Arc::clone(&cluster),
        store,
    };
    let app = covey_server::app(state);

    let listener = TcpListener::bind(config.bind).await?;
    info!(
        "Covey server listening on {} (node id: {:?}, role: {})",
        config.bind,
        cluster.self_id(),
        cluster.role()
    );
    axum::serve(listener, app).await?;

    Ok(())
}
