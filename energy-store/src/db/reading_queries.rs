use chrono::NaiveDateTime;
use sqlx::MySqlPool;

use super::{ReadingStore, StoreError, TableName};
use crate::domain::CanonicalRecord;

/// Readings table in MySQL/MariaDB.
///
/// Expected columns: `ts_real` (DATETIME, unique key), `consumption` and
/// `production` (Wh), and the legacy weather columns that are zeroed on write.
pub struct MySqlReadingStore {
    pool: MySqlPool,
    table: TableName,
    upsert_sql: String,
    latest_sql: String,
}

impl MySqlReadingStore {
    pub fn new(pool: MySqlPool, table: TableName) -> Self {
        let quoted = table.quoted();
        let upsert_sql = format!(
            r#"
            INSERT INTO {quoted} (
                ts_real,
                consumption,
                production,
                temperatire_air,
                temperature_comfort,
                cloudiness,
                windspeed,
                windchill
            ) VALUES (?, ?, ?, 0, 0, 0, 0, 0)
            ON DUPLICATE KEY UPDATE
                consumption = ?,
                production = ?,
                temperatire_air = 0,
                temperature_comfort = 0,
                cloudiness = 0,
                windspeed = 0,
                windchill = 0
            "#
        );
        let latest_sql = format!("SELECT MAX(ts_real) FROM {quoted}");

        Self {
            pool,
            table,
            upsert_sql,
            latest_sql,
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }
}

#[async_trait::async_trait]
impl ReadingStore for MySqlReadingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::Connection::ping(&mut *conn).await?;
        Ok(())
    }

    async fn latest_timestamp(&self) -> Result<Option<NaiveDateTime>, StoreError> {
        let latest = sqlx::query_scalar::<_, Option<NaiveDateTime>>(&self.latest_sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(latest)
    }

    async fn upsert_reading(&self, reading: &CanonicalRecord) -> Result<(), StoreError> {
        // Single statement, so each row is either fully replaced or untouched.
        sqlx::query(&self.upsert_sql)
            .bind(reading.ts_real())
            .bind(reading.consumption_wh)
            .bind(reading.production_wh)
            .bind(reading.consumption_wh)
            .bind(reading.production_wh)
            .execute(&self.pool)
            .await?;

        tracing::trace!(table = %self.table, ts = %reading.ts_real(), "reading upserted");
        Ok(())
    }
}
