//! Database layer for PUP STAR
//!
//! Provides:
//! - SeaORM entity models
//! - Repository implementing the record and account stores
//! - Connection pool management with startup retry
//! - Embedded schema migrations

pub mod models;
mod repository;

pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use backoff::ExponentialBackoffBuilder;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::{info, warn};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using configuration, retrying with exponential backoff.
    ///
    /// Gives up after three connect timeouts' worth of attempts.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(Duration::from_secs(config.connect_timeout_secs * 3)))
            .build();

        let conn = backoff::future::retry_notify(
            policy,
            || {
                let opts = opts.clone();
                async move { Database::connect(opts).await.map_err(backoff::Error::transient) }
            },
            |err: DbErr, wait: Duration| {
                warn!(error = %err, retry_in_ms = wait.as_millis() as u64, "Database connection failed, retrying");
            },
        )
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect: {}", e),
        })?;

        info!("Database connection established");
        Ok(Self { conn })
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply the embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(self.conn.get_postgres_connection_pool())
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Migration failed: {}", e),
            })?;

        info!("Database migrations applied");
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }
}
