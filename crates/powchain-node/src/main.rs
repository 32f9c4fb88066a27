use clap::Parser;
use powchain_core::MemoryStore;
use powchain_node::{api, peers, Args, HttpPeerClient, Miner, Node};
use powchain_storage::open_store;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    let store = match open_store(config.storage, &config.data_dir) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "state store unavailable, falling back to memory");
            Arc::new(MemoryStore::new())
        }
    };
    let node = Node::new(config.clone(), store, Arc::new(HttpPeerClient::new()))?;

    if let Some(seed) = &config.bootstrap {
        match node.bootstrap(seed).await {
            Ok(peers) => info!(seed = %seed, known = peers.len(), "bootstrap complete"),
            Err(e) => warn!(seed = %seed, error = %e, "bootstrap registration failed"),
        }
    }

    if config.mining_enabled {
        tokio::spawn(Miner::new(node.clone())?.run());
    } else {
        info!("mining disabled");
    }
    tokio::spawn(peers::run_pruner(node.clone()));

    let app = api::router(node.clone()).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, advertise = %config.advertise, node_id = %node.id(), "powchain-node listening");

    let signal_node = node.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            signal_node.shutdown();
        })
        .await?;

    node.flush();
    info!("powchain-node stopped");
    Ok(())
}
