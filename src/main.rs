use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rust_meridian::config::MeridianConfig;
use rust_meridian::error::MeridianError;
use rust_meridian::init;
use rust_meridian::storage::Storage;

#[derive(Parser)]
#[command(name = "meridian", version, about = "Meridian platform node")]
struct Cli {
    /// Path to the platform config
    #[arg(short, long, default_value = "meridian.toml")]
    config: String,

    /// Keep all state in memory instead of the configured database
    #[arg(long)]
    ephemeral: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("meridian: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), MeridianError> {
    let cli = Cli::parse();
    let config = MeridianConfig::load_or_default(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.node.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let disk = if cli.ephemeral {
        None
    } else {
        Some(Arc::new(Storage::open(&config.node.db_path)?))
    };

    let platform = init::bootstrap(&config, disk)?;
    tracing::info!(
        accounts = %platform.accounts.shell.address(),
        fungible = %platform.fungible.shell.address(),
        items = %platform.items.shell.address(),
        directory = %platform.directory.shell.address(),
        "meridian platform is up"
    );

    // record the deployed shell addresses for off-band tooling
    let record = serde_json::json!({
        "accounts": platform.accounts.shell.address().as_str(),
        "fungible": platform.fungible.shell.address().as_str(),
        "items": platform.items.shell.address().as_str(),
        "directory": platform.directory.shell.address().as_str(),
    });
    let pretty = serde_json::to_string_pretty(&record)
        .map_err(|e| MeridianError::Storage(e.to_string()))?;
    std::fs::write("deployment.json", pretty)
        .map_err(|e| MeridianError::Storage(e.to_string()))?;
    Ok(())
}
