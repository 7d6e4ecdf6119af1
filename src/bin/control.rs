//! `broadstream-control HOST SERVER_PORT UDP_PORT` — interactive control
//! client that drives a running server's station selection.

use anyhow::Context;
use clap::Parser;

use broadstream::config::ControlArgs;
use broadstream::console::ControlClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = ControlArgs::parse();

    let client = ControlClient::connect(&args.host, args.server_port, args.udp_port, args.extended)
        .await
        .with_context(|| format!("could not connect to {}:{}", args.host, args.server_port))?;

    client.run_repl().await;
    Ok(())
}
