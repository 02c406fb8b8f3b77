use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// A local gateway bridging Ollama, OpenAI and Anthropic chat clients to
/// GitHub Copilot.
#[derive(Debug, Parser)]
#[command(name = "copilot-relay", version)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "COPILOT_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides the configured listen address.
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Log filter directive, e.g. `info` or `gateway=debug`.
    #[arg(long)]
    pub log: Option<String>,
}
