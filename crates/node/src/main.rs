//! Single-process cluster node for benchmark runs.
//!
//! Co-locates the recording archive, the consensus module and the clustered
//! service container inside one process, launches them in order and holds
//! until interrupted, then releases them in reverse order.
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::PathBuf;

use clap::Parser;
use replog_node::{
    Bootstrap, DIR_PROP_NAME, EchoService, Error, NodeOptions, Properties, Result, SharedContext,
    compose_configs, reclaim_stale_state, write_liveness_records,
};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "cluster-node")]
#[command(about = "Single-process cluster node: archive, consensus module and service container")]
struct Args {
    /// Property files merged in order; later files replace earlier ones and
    /// file values take precedence over the environment.
    property_files: Vec<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let properties = Properties::load(&args.property_files)?;

    let base_dir = properties.get(DIR_PROP_NAME).map_or_else(
        || std::env::temp_dir().join("replog-cluster"),
        PathBuf::from,
    );
    std::fs::create_dir_all(&base_dir)
        .map_err(|e| Error::Io("failed to create base directory", e))?;
    info!(base_dir = %base_dir.display(), "cluster node starting");

    let options = NodeOptions::from_properties(&properties);
    let shared = SharedContext::new(base_dir);
    let configs = compose_configs(&shared, &options);

    write_liveness_records(&shared, &configs)?;
    reclaim_stale_state(&configs.consensus.cluster_dir)?;

    let service = Box::new(EchoService::new(options.snapshot_size));
    let mut node = Bootstrap::new(configs, service).initialize().await?;

    info!("cluster node running, send SIGINT to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }

    node.shutdown().await
}
