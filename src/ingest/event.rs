use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// The six sensor channels every child node reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    Humidity,
    Light,
    SoilCapacitive,
    SoilResistive,
    WaterLevel,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Light,
        Channel::SoilCapacitive,
        Channel::SoilResistive,
        Channel::WaterLevel,
    ];

    /// Resolve a wire key to its channel.
    ///
    /// The ESP32 firmware sends the short Spanish keys (`temp`, `hum`, `luz`,
    /// `hum_cap`, `hum_res`, `nivel_agua`); the English names are accepted too.
    pub fn from_wire_key(key: &str) -> Option<Self> {
        match key {
            "temp" | "temperature" => Some(Self::Temperature),
            "hum" | "humidity" => Some(Self::Humidity),
            "luz" | "light" => Some(Self::Light),
            "hum_cap" | "soil_cap" | "soilCap" => Some(Self::SoilCapacitive),
            "hum_res" | "soil_res" | "soilRes" => Some(Self::SoilResistive),
            "nivel_agua" | "water_level" | "waterLevel" | "level_water" => Some(Self::WaterLevel),
            _ => None,
        }
    }

    /// Column name in `device_data` and field key in the `sensor_data` point.
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Light => "light",
            Self::SoilCapacitive => "soil_cap",
            Self::SoilResistive => "soil_res",
            Self::WaterLevel => "level_water",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A malformed or incomplete sensor event. Always the caller's fault.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing device id (child_id)")]
    MissingDeviceId,

    #[error("missing required reading: {0}")]
    MissingChannel(Channel),

    #[error("invalid value for {channel}: {value}")]
    InvalidValue { channel: Channel, value: String },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Identifiers end up as line-protocol tags, which cannot hold control
    /// characters.
    #[error("invalid {field}: {value:?} contains control characters")]
    InvalidIdentifier { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// SensorEvent
// ---------------------------------------------------------------------------

/// One sensor reading as decoded from a gateway request.
///
/// Nothing is guaranteed about its completeness; [`SensorEvent::validate`]
/// turns it into a [`SensorRecord`] or explains what is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorEvent {
    /// Reporting child device (`child_id` on the wire).
    pub device_id: Option<String>,
    pub readings: BTreeMap<Channel, f64>,
    /// Relaying gateway. Audit only.
    pub gateway_id: Option<String>,
    /// Capture time reported by the gateway.
    pub timestamp: Option<DateTime<Utc>>,
}

impl SensorEvent {
    /// Check that the device id and all six channels are present, producing
    /// the record both stores persist.
    pub fn validate(&self) -> Result<SensorRecord, ValidationError> {
        let device_id = identifier("device_id", self.device_id.as_deref())?
            .ok_or(ValidationError::MissingDeviceId)?;
        let gateway_id = identifier("gateway_id", self.gateway_id.as_deref())?;

        let value = |channel: Channel| -> Result<f64, ValidationError> {
            let v = *self
                .readings
                .get(&channel)
                .ok_or(ValidationError::MissingChannel(channel))?;
            if !v.is_finite() {
                return Err(ValidationError::InvalidValue {
                    channel,
                    value: v.to_string(),
                });
            }
            Ok(v)
        };

        Ok(SensorRecord {
            device_id: device_id.to_owned(),
            gateway_id: gateway_id.map(str::to_owned),
            timestamp: self.timestamp,
            temperature: value(Channel::Temperature)?,
            humidity: value(Channel::Humidity)?,
            light: value(Channel::Light)?,
            soil_cap: value(Channel::SoilCapacitive)?,
            soil_res: value(Channel::SoilResistive)?,
            water_level: value(Channel::WaterLevel)?,
        })
    }
}

/// Trimmed identifier, `None` when absent or blank.
fn identifier<'a>(
    field: &'static str,
    raw: Option<&'a str>,
) -> Result<Option<&'a str>, ValidationError> {
    let Some(id) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidIdentifier {
            field,
            value: id.to_owned(),
        });
    }
    Ok(Some(id))
}

// ---------------------------------------------------------------------------
// SensorRecord
// ---------------------------------------------------------------------------

/// A complete, validated reading. Each store persists one independent copy.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub device_id: String,
    pub gateway_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    pub light: f64,
    /// Capacitive soil-moisture probe, raw ADC units
    pub soil_cap: f64,
    /// Resistive soil-moisture probe, raw ADC units
    pub soil_res: f64,
    pub water_level: f64,
}

impl SensorRecord {
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
            Channel::Light => self.light,
            Channel::SoilCapacitive => self.soil_cap,
            Channel::SoilResistive => self.soil_res,
            Channel::WaterLevel => self.water_level,
        }
    }
}

#[cfg(test)]
impl SensorEvent {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    pub fn with_reading(mut self, channel: Channel, value: f64) -> Self {
        self.readings.insert(channel, value);
        self
    }

    pub fn with_gateway(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = Some(gateway_id.into());
        self
    }
}
