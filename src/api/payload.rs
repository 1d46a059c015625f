use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::errors::AppError;
use crate::ingest::{Channel, SensorEvent, ValidationError};

const NO_DATA: &str = "no data provided";

/// Raw body of `POST /api/esp32/data`, either form-encoded or JSON.
///
/// Form bodies are always flat (`child_id=..&temp=..`). JSON bodies may nest
/// the readings under `sensor_data` (or `readings`) or put them at the top
/// level next to `child_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestPayload(pub Map<String, Value>);

impl<S: Send + Sync> FromRequest<S> for IngestPayload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let map = if is_form {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::bad_request(e.body_text()))?;
            fields
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect()
        } else {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| AppError::bad_request(e.body_text()))?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Err(AppError::bad_request(NO_DATA));
            }
            match serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| AppError::bad_request(format!("invalid JSON body: {e}")))?
            {
                Value::Object(map) => map,
                Value::Null => return Err(AppError::bad_request(NO_DATA)),
                _ => return Err(AppError::bad_request("request body must be a JSON object")),
            }
        };

        if map.is_empty() {
            return Err(AppError::bad_request(NO_DATA));
        }
        Ok(Self(map))
    }
}

impl IngestPayload {
    /// Extract the fields of a [`SensorEvent`].
    ///
    /// Absent fields stay absent, leaving completeness checks to
    /// [`SensorEvent::validate`]. A field that is present but cannot be read
    /// as a number or timestamp is rejected here.
    pub fn into_event(self) -> Result<SensorEvent, ValidationError> {
        let mut map = self.0;

        let device_id = take_text(&mut map, "child_id").or_else(|| take_text(&mut map, "device_id"));
        let gateway_id = take_text(&mut map, "gateway_id");
        let timestamp = match map.remove("timestamp") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(parse_timestamp(&raw)?),
        };

        let block = match map.remove("sensor_data").or_else(|| map.remove("readings")) {
            Some(Value::Object(inner)) => inner,
            _ => map,
        };

        let mut readings = std::collections::BTreeMap::new();
        for (key, value) in block {
            let Some(channel) = Channel::from_wire_key(&key) else {
                debug!(key = %key, "Ignoring unknown reading key");
                continue;
            };
            if value.is_null() {
                continue;
            }
            let v = parse_number(&value).ok_or_else(|| ValidationError::InvalidValue {
                channel,
                value: value.to_string(),
            })?;
            readings.insert(channel, v);
        }

        Ok(SensorEvent {
            device_id,
            readings,
            gateway_id,
            timestamp,
        })
    }
}

fn take_text(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Unix seconds (number or numeric string) or an RFC 3339 string.
fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = || ValidationError::InvalidTimestamp(raw.to_string());
    let from_secs = |secs: f64| {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9).round() as u32;
        DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
    };

    match raw {
        Value::Number(n) => n.as_f64().and_then(from_secs).ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<f64>() {
                return from_secs(secs).ok_or_else(invalid);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}
