use crate::db::models::{NewReading, Reading};
use crate::db::{DbPool, DbRunError};
use diesel::SelectableHelper;
use diesel::query_dsl::methods::{LimitDsl, OrderDsl, SelectDsl};
use diesel::ExpressionMethods;
use diesel_async::RunQueryDsl;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on how many rows a single recency query returns.
pub const MAX_READINGS_LIMIT: i64 = 1000;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Pool(#[from] DbRunError),

    #[error(transparent)]
    Db(#[from] diesel::result::Error),
}

/// Append-only log of readings.
#[derive(Clone)]
pub struct TelemetryStore {
    pool: Arc<DbPool>,
}

impl TelemetryStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        TelemetryStore { pool }
    }

    pub async fn append(&self, new_reading: &NewReading) -> Result<Reading, StoreError> {
        use crate::db::schema::readings::dsl::*;

        let mut conn = self.pool.get().await?;
        let inserted = diesel::insert_into(readings)
            .values(new_reading)
            .returning(Reading::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(inserted)
    }

    /// Newest first; `limit` is clamped to `0..=MAX_READINGS_LIMIT`.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Reading>, StoreError> {
        use crate::db::schema::readings::dsl::*;

        let limit = limit.clamp(0, MAX_READINGS_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await?;
        let rows = readings
            .select(Reading::as_select())
            .order(id.desc())
            .limit(limit)
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    pub async fn latest(&self) -> Result<Option<Reading>, StoreError> {
        Ok(self.recent(1).await?.into_iter().next())
    }
}
