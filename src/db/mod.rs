use diesel::ConnectionError;
use diesel::ConnectionResult;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig, bb8};
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};
use std::future::Future;
use std::pin::Pin;

pub mod migrations;
pub mod models;
pub mod schema;

pub type DbConnection = SyncConnectionWrapper<SqliteConnection>;
pub type DbPool = bb8::Pool<DbConnection>;
pub type DbRunError = bb8::RunError;

// Writers wait on each other instead of failing with SQLITE_BUSY.
const CONNECTION_SETUP: &str = "PRAGMA busy_timeout = 5000; \
                                PRAGMA journal_mode = WAL; \
                                PRAGMA foreign_keys = ON;";

const MAX_POOL_SIZE: u32 = 8;

fn establish_connection(url: &str) -> Pin<Box<dyn Future<Output = ConnectionResult<DbConnection>> + Send + '_>> {
    Box::pin(async move {
        let mut conn = DbConnection::establish(url).await?;
        conn.batch_execute(CONNECTION_SETUP)
            .await
            .map_err(ConnectionError::CouldntSetupConfiguration)?;
        Ok(conn)
    })
}

pub async fn create_pool(database_url: &str) -> Result<DbPool, diesel_async::pooled_connection::PoolError> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup = Box::new(establish_connection);
    let manager =
        AsyncDieselConnectionManager::<DbConnection>::new_with_config(database_url, manager_config);
    DbPool::builder().max_size(MAX_POOL_SIZE).build(manager).await
}
