//! Protocol constants and CLI-derived configuration for the three binaries.

use std::time::Duration;

use clap::Parser;

/// Bytes read from a song per broadcast tick.
pub const CHUNK: usize = 256;

/// Pacing interval between chunks in production.
pub const TICK: Duration = Duration::from_millis(1000);

/// Minimum read-buffer size for a session's control channel.
pub const CONTROL_BUFFER: usize = 4096;

/// `broadstream-server PORT FILE [FILE ...]`
#[derive(Parser, Debug, Clone)]
#[command(name = "broadstream-server", about = "Multi-station radio broadcaster")]
pub struct ServerArgs {
    /// TCP port the control plane listens on.
    pub port: u16,

    /// One station per file. In extended mode each FILE is a comma-joined playlist.
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<String>,

    /// Enable extended mode (multi-song playlists, songs-list query, add/remove-station).
    #[arg(short = 'e', long = "extended")]
    pub extended: bool,
}

/// `broadstream-control HOST SERVER_PORT UDP_PORT`
#[derive(Parser, Debug, Clone)]
#[command(name = "broadstream-control", about = "Radio control client")]
pub struct ControlArgs {
    pub host: String,
    pub server_port: u16,
    pub udp_port: u16,

    #[arg(short = 'e', long = "extended")]
    pub extended: bool,
}

/// `broadstream-listener UDP_PORT`
#[derive(Parser, Debug, Clone)]
#[command(name = "broadstream-listener", about = "UDP audio listener")]
pub struct ListenerArgs {
    pub udp_port: u16,
}
