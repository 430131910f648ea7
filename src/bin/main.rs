use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use relaylink::{cli::Cli, Config, Server};

#[tokio::main]
pub async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::from_args();
    let config_path = cli.config_path()?;
    let config = Config::load(&config_path).await?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();

    let server = Server::builder(config).build()?;
    let addr = server.start().await?;
    tracing::info!(%addr, "listening");

    tokio::signal::ctrl_c().await?;
    server.shutdown().await;

    Ok(())
}
