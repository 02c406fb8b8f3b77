use std::path::PathBuf;

use args::Args;
use clap::Parser;
use config::Config;
use tokio::net::TcpListener;

mod args;
mod logger;

const DEFAULT_CONFIG_PATH: &str = "copilot-relay.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    logger::init(args.log.as_deref().unwrap_or(&config.log.filter));

    let listen_address = args.listen.unwrap_or_else(|| config.server.listen_address());
    let router = gateway::router(&config)?;

    let listener = TcpListener::bind(listen_address).await?;
    log::info!("Copilot Relay listening on http://{listen_address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Copilot Relay shut down");

    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => Config::load(path),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);

            if default_path.exists() {
                Config::load(default_path)
            } else {
                let config = Config::default();
                config.validate()?;

                Ok(config)
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to install interrupt handler: {e}");
    }
}
