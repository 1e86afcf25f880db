//! Place Indexer Main Entry Point
//!
//! Builds and maintains the geocoding index. What it does is selected with
//! `PLACE_INDEXER_MODE`: recreate the index, run a full import, run one update cycle, or
//! run update cycles periodically until interrupted.

use dotenv::dotenv;
use place_indexer::{Dependencies, IndexingError, RunMode};
use std::env;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("place_indexer=info,place_indexer_repository=info"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .map_err(|e| IndexingError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "place-indexer",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init()
            .map_err(|e| IndexingError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "place-indexer",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }

    Ok(())
}

async fn run(deps: Dependencies) -> Result<(), IndexingError> {
    let runner = &deps.runner;

    match deps.settings.mode {
        RunMode::RecreateIndex => {
            runner.run_recreate().await?;
        }
        RunMode::Import => {
            runner.run_import().await?;
        }
        RunMode::Update => {
            runner.update_pipeline().initialize_marker().await?;
            runner.run_update().await?;
        }
        RunMode::UpdateLoop => {
            runner.update_pipeline().initialize_marker().await?;
            info!(health = ?deps.geocoder.health(), "Index status");
            runner.run_update_loop(deps.settings.update_interval).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing()?;

    info!("Starting place indexer");

    let deps = match Dependencies::new().await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    match run(deps).await {
        Ok(()) => {
            info!("Place indexer completed successfully");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Place indexer failed");
            Err(e)
        }
    }
}
