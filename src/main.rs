use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber;

use turnstile::config::{build_filter, FilterConfig};
use turnstile::store::LocalCounterStore;

/// Validate an admission filter rules file.
///
/// Loads the configuration, builds the filter against a local store, and
/// exits non-zero on any misconfiguration, so deployments can fail fast
/// before traffic arrives.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to the YAML rules file
    #[arg(short, long)]
    rules: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    if args.json {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(false)
            .init();
    }

    info!("Turnstile rules check");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = FilterConfig::from_file(&args.rules)?;
    let store = Arc::new(LocalCounterStore::new());
    let filter = build_filter(&config, store)?;

    info!(rules = filter.rules().len(), "Rules file is valid");
    Ok(())
}
