//! `broadstream-server PORT FILE [FILE ...]` — accepts subscribers over TCP
//! and fans audio out over UDP for each configured station.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use broadstream::config::{ServerArgs, TICK};
use broadstream::console::run_server_console;
use broadstream::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = ServerArgs::parse();

    let playlists: Vec<Vec<String>> = args
        .files
        .iter()
        .map(|entry| {
            if args.extended {
                entry.split(',').map(str::to_string).collect()
            } else {
                vec![entry.clone()]
            }
        })
        .collect();

    let server = Server::bind(args.port, &playlists, args.extended, TICK)
        .await
        .with_context(|| format!("could not start server on port {}", args.port))?;
    let server = Arc::new(server);

    info!(port = args.port, stations = playlists.len(), "server listening");

    let listen_server = Arc::clone(&server);
    tokio::spawn(async move {
        listen_server.listen().await;
    });

    run_server_console(server, args.extended).await;
    Ok(())
}
