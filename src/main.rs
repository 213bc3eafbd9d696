//! segment-guard - safe natural-language patient segments over a multi-tenant clinic database.

use std::sync::Arc;

use anyhow::Context;
use segment_guard::cli::Cli;
use segment_guard::config::Config;
use segment_guard::db::{self, ExecutionChannel, MockChannel};
use segment_guard::llm::create_client;
use segment_guard::logging;
use segment_guard::query::{QueryResponse, SegmentService};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    }
}

/// Runs one request and prints the response. Returns whether it succeeded.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let provider = cli.llm_provider(&config)?;
    let generator = create_client(provider, cli.llm_model(&config), None)
        .context("Failed to create LLM client")?;
    info!(provider = %provider, "Generator ready");

    let channel = open_channel(&cli, &config).await;
    let service = SegmentService::new(Arc::from(generator), channel.clone());

    let response = service.handle(&cli.to_request(), cli.tenant().as_ref()).await;
    print_response(&response, cli.pretty)?;

    if let Some(channel) = channel {
        if let Err(e) = channel.close().await {
            warn!("Failed to close execution channel: {}", e);
        }
    }

    Ok(response.is_ok())
}

/// Opens the read-only channel, if one is configured.
///
/// A channel that cannot be opened is left out rather than failing startup;
/// previews still work and any execution reports setup required.
async fn open_channel(cli: &Cli, config: &Config) -> Option<Arc<dyn ExecutionChannel>> {
    if cli.mock_db {
        info!("Using in-memory sample channel");
        return Some(Arc::new(MockChannel::with_sample_patients()));
    }

    let Some(database) = cli.database_config(config) else {
        info!("No database configured; execution is unavailable");
        return None;
    };

    info!("Connecting read-only channel to {}", database.display_string());
    match db::connect(&database, &config.sandbox).await {
        Ok(channel) => Some(Arc::from(channel)),
        Err(e) => {
            warn!("Read-only channel unavailable: {}", e);
            None
        }
    }
}

fn print_response(response: &QueryResponse, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    println!("{json}");
    Ok(())
}
