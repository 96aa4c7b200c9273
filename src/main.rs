//! # Conductor Sync Main Entry Point
//!
//! This is the main entry point for the Conductor Sync service.

use conductor_sync::{
    config::ConfigLoader, db::init_pool, server::run_server, telemetry::init_tracing,
};
use sea_orm_migration::MigratorTrait;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    init_tracing(&config)?;

    // Log the loaded configuration (secrets redacted)
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    migration::Migrator::up(&db, None).await?;

    // Start the server with the loaded configuration
    run_server(config, db).await
}
