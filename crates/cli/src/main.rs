//! Ferrous DNS: entry point wiring a `CorePipeline` to a UDP listener.

mod bootstrap;
mod di;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "ferrous-dns")]
#[command(version)]
#[command(about = "ECS-aware caching DNS front-end")]
struct Cli {
    /// Address to listen for DNS queries on.
    #[arg(short = 'b', long, default_value = "0.0.0.0:53")]
    bind: SocketAddr,

    /// Upstream resolver a cache miss is forwarded to.
    #[arg(short = 'u', long, default_value = "1.1.1.1:53")]
    upstream: SocketAddr,

    /// Path to a TOML config file. Defaults are used for any field it
    /// omits or if no path is given.
    #[arg(short = 'c', long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::init_logging();

    let cli = Cli::parse();

    info!("ferrous-dns starting");

    let config = bootstrap::load_config(cli.config.as_deref())?;
    let pipeline = Arc::new(di::build_pipeline(&config, cli.upstream)?);

    info!(upstream = %cli.upstream, "pipeline ready");

    server::start_dns_server(cli.bind, pipeline).await
}
