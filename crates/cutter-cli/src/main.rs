//! cutter - release packaging pipeline CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cutter_cli::cmd;
use cutter_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build => cmd::build::build(&cli.manifest).await,
        Commands::Publish { bucket, aliases } => {
            cmd::publish::publish(&cli.manifest, bucket, aliases).await
        }
    }
}
