use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "browser-bridge")]
#[command(version)]
#[command(about = "Serve a browser engine to remote clients")]
pub struct Cli {
    /// Local socket path to listen on (default: <temp dir>/cef_server_pipe)
    #[arg(long, env = "BROWSER_BRIDGE_PIPE", conflicts_with = "port")]
    pub pipe: Option<PathBuf>,

    /// Listen on this TCP port of 127.0.0.1 instead of a local socket
    #[arg(long, env = "BROWSER_BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Bound on synchronous engine calls, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Directory for persistent engine data
    #[arg(long)]
    pub cache_path: Option<PathBuf>,

    /// Path to config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
