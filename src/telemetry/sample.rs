//! # Telemetry Sample Decoding
//!
//! Decodes raw JSON text into a [`TelemetrySample`] and classifies it into
//! exactly one metric group before any series state is touched.

use chrono::{DateTime, Local, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Key of the optional single-level envelope around a sample
const ENVELOPE_KEY: &str = "payload";

/// Display format for series labels (local wall-clock time)
const LABEL_FORMAT: &str = "%H:%M:%S";

/// A parsed inbound telemetry record
///
/// Every field is optional on the wire. `null` is treated the same as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TelemetrySample {
    /// Seconds since the Unix epoch; anything but a finite number is ignored
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub rpm: Option<f64>,
    pub altitude_relative: Option<f64>,
    pub speed: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub flight_mode: Option<String>,
}

/// Keep a `timestamp` only when it is a finite JSON number
///
/// A bad timestamp must not cost the sample its values; the label then falls
/// back to receipt time.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()).filter(|ts| ts.is_finite()))
}

/// Metric groups a sample can be classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleGroup {
    /// Voltage, current and RPM
    Esc,
    /// Latitude/longitude fix plus altitude and speed
    Position,
    /// Altitude and speed without a fix
    Telemetry,
}

impl SampleGroup {
    /// Whether `sample` carries the discriminating fields of this group
    pub fn matches(self, sample: &TelemetrySample) -> bool {
        match self {
            SampleGroup::Esc => sample.voltage.is_some() && sample.current.is_some(),
            SampleGroup::Position => sample.latitude.is_some() && sample.longitude.is_some(),
            SampleGroup::Telemetry => {
                sample.flight_mode.is_some() || sample.altitude_relative.is_some()
            }
        }
    }
}

/// Ordered group discriminators; the first matching group wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    precedence: Vec<SampleGroup>,
}

impl ClassificationRules {
    /// Build rules from an explicit precedence list
    ///
    /// Groups left out of the list are never matched.
    pub fn new(precedence: Vec<SampleGroup>) -> Self {
        Self { precedence }
    }

    pub fn precedence(&self) -> &[SampleGroup] {
        &self.precedence
    }

    /// Classify a decoded sample into a tagged variant
    ///
    /// Missing optional numeric values default to `0.0` so that every dataset
    /// in the chosen group receives a value.
    pub fn classify(&self, sample: &TelemetrySample) -> ClassifiedSample {
        let group = self.precedence.iter().copied().find(|g| g.matches(sample));

        match group {
            Some(SampleGroup::Esc) => ClassifiedSample::Esc(EscSample {
                voltage: sample.voltage.unwrap_or_default(),
                current: sample.current.unwrap_or_default(),
                rpm: sample.rpm.unwrap_or_default(),
            }),
            Some(SampleGroup::Position) => ClassifiedSample::Position(PositionSample {
                position: Position {
                    latitude: sample.latitude.unwrap_or_default(),
                    longitude: sample.longitude.unwrap_or_default(),
                },
                flight: FlightSample::from_sample(sample),
            }),
            Some(SampleGroup::Telemetry) => {
                ClassifiedSample::Telemetry(FlightSample::from_sample(sample))
            }
            None => ClassifiedSample::Unrecognized,
        }
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self::new(vec![SampleGroup::Esc, SampleGroup::Position, SampleGroup::Telemetry])
    }
}

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// ESC group values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscSample {
    pub voltage: f64,
    pub current: f64,
    pub rpm: f64,
}

/// Flight-state values appended to the telemetry series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightSample {
    pub altitude: f64,
    pub speed: f64,
}

impl FlightSample {
    fn from_sample(sample: &TelemetrySample) -> Self {
        Self {
            altitude: sample.altitude_relative.unwrap_or_default(),
            speed: sample.speed.unwrap_or_default(),
        }
    }
}

/// Position fix together with the flight values that came with it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub position: Position,
    pub flight: FlightSample,
}

/// Result of classification, computed before any state mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassifiedSample {
    Esc(EscSample),
    Position(PositionSample),
    Telemetry(FlightSample),
    Unrecognized,
}

impl ClassifiedSample {
    /// Group this variant belongs to, if any
    pub fn group(&self) -> Option<SampleGroup> {
        match self {
            ClassifiedSample::Esc(_) => Some(SampleGroup::Esc),
            ClassifiedSample::Position(_) => Some(SampleGroup::Position),
            ClassifiedSample::Telemetry(_) => Some(SampleGroup::Telemetry),
            ClassifiedSample::Unrecognized => None,
        }
    }
}

/// Decode a raw text message into a sample
///
/// Accepts either a bare JSON object or one wrapped as `{ "payload": {...} }`.
///
/// # Errors
///
/// Returns [`DashboardError::Decode`](crate::error::DashboardError::Decode) if
/// the text is not JSON, is not an object, or a field has the wrong type.
pub fn decode_sample(raw: &str) -> Result<TelemetrySample> {
    let value: Value = serde_json::from_str(raw)?;

    let object = match value {
        Value::Object(mut map) => match map.remove(ENVELOPE_KEY) {
            Some(Value::Object(inner)) => Value::Object(inner),
            Some(other) => {
                map.insert(ENVELOPE_KEY.to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => {
            return Err(serde_json::Error::custom(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))
            .into())
        }
    };

    Ok(serde_json::from_value(object)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Display label shared by every dataset a message updates
///
/// Uses the sample's own `timestamp` when it is a usable non-zero value,
/// otherwise the time the message was received.
pub fn display_label(timestamp: Option<f64>, received_at: DateTime<Utc>) -> String {
    let at = timestamp
        .filter(|ts| ts.is_finite() && *ts != 0.0)
        .and_then(|ts| DateTime::<Utc>::from_timestamp_millis((ts * 1000.0).round() as i64))
        .unwrap_or(received_at);

    at.with_timezone(&Local).format(LABEL_FORMAT).to_string()
}
