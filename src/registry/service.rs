use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use utoipa::ToSchema;

use crate::db::models::DeviceDataRow;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CreateUserOutcome {
    Created { user_id: i64 },
    Exists { user_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegisterDeviceOutcome {
    Registered { device_id: i64 },
    Exists { device_id: i64 },
    UserNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteDeviceOutcome {
    Deleted { device_id: i64 },
    NotFound,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

// ---------------------------------------------------------------------------
// RegistryService
// ---------------------------------------------------------------------------

/// User and gateway-device bookkeeping plus read access to the relational
/// measurement log. Every operation touches Postgres only.
#[derive(Debug, Clone)]
pub struct RegistryService {
    pool: PgPool,
}

impl RegistryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a user unless one with the same email already exists.
    pub async fn create_user(&self, user: &NewUser) -> sqlx::Result<CreateUserOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO users (first_name, last_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(user_id) => {
                info!(user_id, "User created");
                CreateUserOutcome::Created { user_id }
            }
            None => {
                let user_id = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
                    .bind(&user.email)
                    .fetch_one(&mut *tx)
                    .await?;
                CreateUserOutcome::Exists { user_id }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Register a gateway for the user owning `email`.
    pub async fn register_device(
        &self,
        gateway_id: &str,
        email: &str,
    ) -> sqlx::Result<RegisterDeviceOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM devices WHERE identifier = $1")
            .bind(gateway_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(device_id) = existing {
            return Ok(RegisterDeviceOutcome::Exists { device_id });
        }

        let user_id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(user_id) = user_id else {
            return Ok(RegisterDeviceOutcome::UserNotFound);
        };

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO devices (identifier, user_id)
            VALUES ($1, $2)
            ON CONFLICT (identifier) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(gateway_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        // Lost a race with a concurrent registration of the same gateway
        let Some(device_id) = inserted else {
            let device_id = sqlx::query_scalar("SELECT id FROM devices WHERE identifier = $1")
                .bind(gateway_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(RegisterDeviceOutcome::Exists { device_id });
        };

        tx.commit().await?;
        info!(gateway_id = %gateway_id, user_id, device_id, "Device registered");
        Ok(RegisterDeviceOutcome::Registered { device_id })
    }

    /// Delete a device, provided it belongs to the user owning `email`.
    pub async fn delete_device(
        &self,
        device_id: i64,
        email: &str,
    ) -> sqlx::Result<DeleteDeviceOutcome> {
        let result = sqlx::query(
            r#"
            DELETE FROM devices d
            USING users u
            WHERE d.user_id = u.id
              AND d.id = $1
              AND u.email = $2
            "#,
        )
        .bind(device_id)
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(DeleteDeviceOutcome::NotFound);
        }
        info!(device_id, "Device deleted");
        Ok(DeleteDeviceOutcome::Deleted { device_id })
    }

    /// Readings relayed by the gateway registered as `device_id`, newest
    /// first. `None` when no such device exists.
    pub async fn measurements_for_device(
        &self,
        device_id: i64,
    ) -> sqlx::Result<Option<Vec<DeviceDataRow>>> {
        let identifier: Option<String> =
            sqlx::query_scalar("SELECT identifier FROM devices WHERE id = $1")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(identifier) = identifier else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, DeviceDataRow>(
            r#"
            SELECT id, device_id, gateway_id, recorded_at,
                   temperature, humidity, light, soil_cap, soil_res, level_water
            FROM device_data
            WHERE gateway_id = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(rows))
    }

    /// Readings relayed by every gateway the user owning `email` registered,
    /// newest first.
    pub async fn measurements_for_user(&self, email: &str) -> sqlx::Result<Vec<DeviceDataRow>> {
        sqlx::query_as::<_, DeviceDataRow>(
            r#"
            SELECT dd.id, dd.device_id, dd.gateway_id, dd.recorded_at,
                   dd.temperature, dd.humidity, dd.light,
                   dd.soil_cap, dd.soil_res, dd.level_water
            FROM device_data dd
            JOIN devices d ON dd.gateway_id = d.identifier
            JOIN users u   ON d.user_id = u.id
            WHERE u.email = $1
            ORDER BY dd.recorded_at DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
