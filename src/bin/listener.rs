//! `broadstream-listener UDP_PORT` — binds UDP and writes every received
//! datagram's payload verbatim to stdout for an external decoder to consume.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use broadstream::config::ListenerArgs;
use broadstream::console::run_listener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = ListenerArgs::parse();
    info!(port = args.udp_port, "listening for audio datagrams");

    run_listener(args.udp_port)
        .await
        .with_context(|| format!("listener failed on port {}", args.udp_port))?;
    Ok(())
}
