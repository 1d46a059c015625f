use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row of the relational measurement log (`device_data`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeviceDataRow {
    pub id: Uuid,
    /// Reporting child device.
    pub device_id: String,
    /// Relaying gateway, when the reading carried one.
    pub gateway_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    pub light: f64,
    pub soil_cap: f64,
    pub soil_res: f64,
    pub level_water: f64,
}
