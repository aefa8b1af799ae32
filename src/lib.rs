//! Telemetry ingestion, alerting and firmware distribution for the battery
//! monitor devices.

pub mod api;
pub mod config;
pub mod db;
pub mod firmware;
pub mod telemetry;

pub use db::DbPool;

use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to create database pool: {0}")]
    Pool(#[from] diesel_async::pooled_connection::PoolError),

    #[error("failed to get database connection: {0}")]
    Connection(#[from] db::DbRunError),

    #[error(transparent)]
    Migration(#[from] db::migrations::MigrationError),
}

/// Opens the database and brings its schema up to date. The store must not
/// take traffic before this has returned.
pub async fn init_database(database_url: &str) -> Result<Arc<DbPool>, StartupError> {
    let pool = db::create_pool(database_url).await?;
    {
        let mut conn = pool.get().await?;
        db::migrations::run_migrations(&mut conn).await?;
    }
    Ok(Arc::new(pool))
}
