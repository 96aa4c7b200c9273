//! SeaORM pool setup for the sync store.
//!
//! Production runs on Postgres; tests and local smoke runs use SQLite.
//! Connecting retries with doubling delays because the service usually
//! races its database out of a cold start in compose environments.

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Errors that can occur while bringing up the pool.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

fn validate_database_url(url: &str) -> Result<(), DatabaseError> {
    if url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        });
    }
    // Only the two backends the migrations are written for.
    if !url.starts_with("postgres://")
        && !url.starts_with("postgresql://")
        && !url.starts_with("sqlite:")
    {
        return Err(DatabaseError::InvalidConfiguration {
            message: format!("Unsupported database URL scheme: {}", url),
        });
    }
    Ok(())
}

/// Initialize the connection pool for the sync store.
///
/// Pool sizing and acquire timeout come from [`AppConfig`]; idle and
/// lifetime limits are fixed below the typical load-balancer idle cutoff
/// so long-lived worker connections get recycled rather than dropped
/// mid-claim.
///
/// # Examples
///
/// ```no_run
/// use conductor_sync::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     // Hand the pool to the repositories...
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    validate_database_url(&cfg.database_url)?;

    let mut options = ConnectOptions::new(&cfg.database_url);
    options
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut retry_delay = INITIAL_RETRY_DELAY;
    let mut last_error = None;

    for attempt in 1..=CONNECT_ATTEMPTS {
        match Database::connect(options.clone()).await {
            Ok(conn) => {
                log::info!("Connected to sync store on attempt {}", attempt);
                return Ok(conn);
            }
            Err(err) => {
                if attempt < CONNECT_ATTEMPTS {
                    log::warn!(
                        "Sync store connection attempt {} failed: {}, retrying in {:?}",
                        attempt,
                        err,
                        retry_delay
                    );
                    sleep(retry_delay).await;
                    retry_delay *= 2;
                }
                last_error = Some(err);
            }
        }
    }

    let source = last_error.expect("at least one connection attempt was made");
    log::error!(
        "Giving up on sync store after {} attempts: {}",
        CONNECT_ATTEMPTS,
        source
    );
    Err(DatabaseError::ConnectionFailed { source }.into())
}

/// Liveness probe for the pool: a trivial round-trip query.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    use sea_orm::Statement;

    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());

    db.query_one(stmt)
        .await
        .context("Database health check failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_database_url_is_rejected() {
        let config = AppConfig {
            database_url: String::new(),
            ..AppConfig::default()
        };

        let result = init_pool(&config).await;
        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_before_connecting() {
        let config = AppConfig {
            database_url: "mysql://localhost/conductor".to_string(),
            ..AppConfig::default()
        };

        let err = init_pool(&config)
            .await
            .unwrap_err()
            .downcast::<DatabaseError>()
            .unwrap();
        assert!(matches!(err, DatabaseError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("mysql"));
    }

    #[tokio::test]
    async fn in_memory_sqlite_url_connects() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..AppConfig::default()
        };

        let db = init_pool(&config).await.expect("sqlite pool");
        health_check(&db).await.expect("health check");
    }
}
