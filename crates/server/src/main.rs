//! measure-saver - HTTP endpoint for network measurement uploads
//!
//! Reads flags, the optional config file, `.env` and `MEASURE_SAVER__*`
//! environment variables, then serves until interrupted.

use clap::Parser;
use server::config::{Cli, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli)?;

    server::start_server(config).await?;

    Ok(())
}
