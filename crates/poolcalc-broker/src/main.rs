//! Relay broker binary.
//!
//! Run:
//!   cargo run -p poolcalc-broker -- --port 9000

use clap::Parser;
use poolcalc_broker::server;
use std::net::{IpAddr, SocketAddr};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "poolcalc-broker", about = "Pairs pool calculator hosts and remotes")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "POOLCALC_PORT", default_value_t = 9000)]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "POOLCALC_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("poolcalc_broker=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let addr = SocketAddr::new(args.bind, args.port);

    tracing::info!("Starting broker on {}", addr);

    server::run(addr).await
}
