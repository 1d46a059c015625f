use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::ingest::{AdapterError, RelationalStore, SensorRecord};

/// Appends readings to `device_data`.
///
/// Each commit runs in its own transaction. The transaction (and the pooled
/// connection behind it) is released when it goes out of scope: committed on
/// success, rolled back on any early return.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationalStore for PgReadingStore {
    async fn commit_reading(&self, record: &SensorRecord) -> Result<(), AdapterError> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO device_data
                (id, device_id, gateway_id, recorded_at,
                 temperature, humidity, light, soil_cap, soil_res, level_water)
            VALUES ($1, $2, $3, COALESCE($4, now()), $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(&record.device_id)
        .bind(record.gateway_id.as_deref())
        .bind(record.timestamp)
        .bind(record.temperature)
        .bind(record.humidity)
        .bind(record.light)
        .bind(record.soil_cap)
        .bind(record.soil_res)
        .bind(record.water_level)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(device_id = %record.device_id, row_id = %id, "device_data row committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sqlx::PgPool;

    use super::*;
    use crate::db::models::DeviceDataRow;

    fn record(device_id: &str) -> SensorRecord {
        SensorRecord {
            device_id: device_id.to_owned(),
            gateway_id: Some("gw-1".into()),
            timestamp: None,
            temperature: 21.5,
            humidity: 60.0,
            light: 300.0,
            soil_cap: 450.0,
            soil_res: 200.0,
            water_level: 80.0,
        }
    }

    async fn rows(pool: &PgPool) -> Vec<DeviceDataRow> {
        sqlx::query_as::<_, DeviceDataRow>("SELECT * FROM device_data ORDER BY recorded_at")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn commit_inserts_one_row(pool: PgPool) {
        let store = PgReadingStore::new(pool.clone());

        store.commit_reading(&record("child123")).await.unwrap();

        let rows = rows(&pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device_id, "child123");
        assert_eq!(rows[0].gateway_id.as_deref(), Some("gw-1"));
        assert_eq!(rows[0].temperature, 21.5);
        assert_eq!(rows[0].level_water, 80.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn same_record_twice_yields_two_rows(pool: PgPool) {
        let store = PgReadingStore::new(pool.clone());
        let r = record("child123");

        store.commit_reading(&r).await.unwrap();
        store.commit_reading(&r).await.unwrap();

        assert_eq!(rows(&pool).await.len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reported_timestamp_is_stored_verbatim(pool: PgPool) {
        let store = PgReadingStore::new(pool.clone());
        let captured = Utc.with_ymd_and_hms(2024, 1, 1, 6, 30, 0).unwrap();
        let mut r = record("child123");
        r.timestamp = Some(captured);

        store.commit_reading(&r).await.unwrap();

        assert_eq!(rows(&pool).await[0].recorded_at, captured);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn repeated_failures_do_not_exhaust_the_pool(pool: PgPool) {
        let store = PgReadingStore::new(pool.clone());
        // Postgres rejects NUL bytes in text values.
        let bad = record("child\0123");

        for _ in 0..25 {
            let err = store.commit_reading(&bad).await.unwrap_err();
            assert!(matches!(err, AdapterError::Database(_)));
        }

        store.commit_reading(&record("child123")).await.unwrap();
        assert_eq!(rows(&pool).await.len(), 1);
    }
}
