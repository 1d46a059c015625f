use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{db::models::DeviceDataRow, ingest::DualWriteResult};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    pub message: String,
    /// Outcome of the commit to each store.
    pub status: DualWriteResult,
}

/// Body of `POST /api/users`. The Spanish field names sent by the first
/// mobile client are accepted as aliases.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[serde(alias = "nombre")]
    pub first_name: Option<String>,
    #[serde(alias = "apellido")]
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDeviceRequest {
    /// Identifier the gateway sends as `gateway_id` with every reading.
    pub gateway_id: Option<String>,
    /// Email of the owning user.
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteDeviceRequest {
    pub device_id: Option<i64>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeasurementDto {
    pub id: Uuid,
    pub device_id: String,
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

impl From<DeviceDataRow> for MeasurementDto {
    fn from(r: DeviceDataRow) -> Self {
        Self {
            id: r.id,
            device_id: r.device_id,
            gateway_id: r.gateway_id,
            recorded_at: r.recorded_at,
            temperature: r.temperature,
            humidity: r.humidity,
            light: r.light,
            soil_cap: r.soil_cap,
            soil_res: r.soil_res,
            level_water: r.level_water,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceMeasurementsResponse {
    pub device_id: i64,
    pub measurements: Vec<MeasurementDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserMeasurementsResponse {
    pub email: String,
    pub measurements: Vec<MeasurementDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
