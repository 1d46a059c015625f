use chrono::{DateTime, Utc};

use crate::ingest::{Channel, SensorRecord};

/// Measurement every sensor reading is written under.
pub const MEASUREMENT: &str = "sensor_data";

// ---------------------------------------------------------------------------
// Point — one line of InfluxDB line protocol
//
//   <measurement>[,<tag_key>=<tag_value>...] <field_key>=<field_value>[,...] <timestamp>
//
// Measurement names escape commas and spaces. Tag keys, tag values and field
// keys additionally escape equals signs. Float fields need no suffix; the
// timestamp is an integer in the precision the write request declares
// (milliseconds here, see `InfluxClient`).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Build the `sensor_data` point for a reading.
    ///
    /// `device_id` (and `gateway_id` when known) become tags; the six channel
    /// values become float fields. Readings without a capture time are
    /// stamped with `received_at`.
    pub fn from_record(record: &SensorRecord, received_at: DateTime<Utc>) -> Self {
        let mut point = Point::new(MEASUREMENT, record.timestamp.unwrap_or(received_at))
            .tag("device_id", record.device_id.as_str());
        if let Some(gateway_id) = &record.gateway_id {
            point = point.tag("gateway_id", gateway_id.as_str());
        }
        Channel::ALL
            .into_iter()
            .fold(point, |p, channel| p.field(channel.field_name(), record.value(channel)))
    }

    /// Timestamp in milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Encode as a single line (no trailing newline).
    pub fn to_line(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape(key, TAG_SPECIALS));
            line.push('=');
            line.push_str(&escape(value, TAG_SPECIALS));
        }
        line.push(' ');
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape(key, TAG_SPECIALS), value))
            .collect();
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&self.timestamp_millis().to_string());
        line
    }
}

const TAG_SPECIALS: &[char] = &[',', '=', ' '];

fn escape(raw: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
