//! Stitching gateway server binary

use anyhow::Context as _;
use clap::Parser;
use graphql_stitching_gateway::{GatewayBuilder, GatewayConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stitching-gateway")]
#[command(about = "Serve one GraphQL schema stitched from many remote GraphQL services")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration file
    #[arg(short, long)]
    listen: Option<String>,

    /// Background reload interval in milliseconds, overrides the configuration file
    #[arg(long)]
    refresh_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(interval) = args.refresh_interval_ms {
        config.refresh_interval_ms = Some(interval);
    }

    tracing::info!(
        endpoints = config.endpoints.len(),
        registry_api = config.registry_api,
        "starting gateway"
    );

    GatewayBuilder::from_config(&config)
        .serve(config.listen.clone())
        .await
        .context("gateway server failed")?;

    Ok(())
}
