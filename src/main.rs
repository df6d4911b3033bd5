use clap::Parser;
use std::{error::Error, path::PathBuf};
use tracing::{error, info, warn};

use hytale_status::StatusClient;
use hytale_status::config::Config;
use hytale_status::logger::setup_logging;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Servers to query, as "host" or "host:port"
    addresses: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    let _guard = setup_logging(&config.logging)?;

    if cli.addresses.is_empty() {
        warn!("No server addresses given, nothing to query");
        return Ok(());
    }

    let client = StatusClient::new(config);
    info!(count = cli.addresses.len(), "Querying servers");

    let results =
        futures::future::join_all(cli.addresses.iter().map(|address| client.query(address)))
            .await;

    for (address, result) in cli.addresses.iter().zip(results) {
        match result {
            Ok(status) => println!("{}", serde_json::to_string(status.as_ref())?),
            Err(e) => error!(address = %address, error = %e, "Query skipped"),
        }
    }

    client.shutdown().await;
    Ok(())
}
