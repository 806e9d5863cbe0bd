//! Topic decoder for inbound broker messages
//!
//! Two firmware generations publish to the same namespace:
//!
//! ```text
//! legacy:  <prefix>/modulo<N>/<sensor>   payload "29.3"
//! batched: <prefix>/modulo<N>/data       payload {"temp":31.5,"hum":58,"nh3":42}
//! ```
//!
//! Decoding is pure. Every message maps to exactly one [`Decoded`] variant,
//! so callers never have to fall back from one parse attempt to another.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::{Reading, Variable};

/// Trailing digits of the module segment (`modulo1`, `module-07`, `M3`)
static MODULE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]*[_-]?(\d+)$").expect("module token pattern is valid")
});

/// Reasons a message is ignored
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("topic `{0}` does not match <prefix>/<module>/<suffix>")]
    TopicShape(String),

    #[error("no module token in topic segment `{0}`")]
    ModuleToken(String),

    #[error("payload is neither a JSON object nor a number")]
    Payload,

    #[error("unknown sensor `{0}`")]
    UnknownSensor(String),

    #[error("non-finite sensor value {0}")]
    NonFinite(f64),
}

/// A batched reading from the JSON firmware
#[derive(Debug, Clone, PartialEq)]
pub struct JsonUpdate {
    pub module_id: String,

    /// Only keys that were present and numeric
    pub values: BTreeMap<Variable, f64>,
}

impl JsonUpdate {
    /// Build a complete reading. Variables missing from the payload stay absent.
    pub fn into_reading(self, captured_at: DateTime<Utc>) -> Reading {
        let mut reading = Reading::new(self.module_id, captured_at);
        for (variable, value) in self.values {
            reading.set(variable, value);
        }
        reading
    }
}

/// A single sensor value from the legacy per-field topics
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarUpdate {
    pub module_id: String,
    pub variable: Variable,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Json(JsonUpdate),
    Scalar(ScalarUpdate),
    Ignored(DecodeError),
}

/// Decode a topic and raw payload
pub fn decode(topic: &str, payload: &[u8]) -> Decoded {
    match try_decode(topic, payload) {
        Ok(decoded) => decoded,
        Err(e) => Decoded::Ignored(e),
    }
}

fn try_decode(topic: &str, payload: &[u8]) -> Result<Decoded, DecodeError> {
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() < 3 {
        return Err(DecodeError::TopicShape(topic.to_string()));
    }

    let module_id = module_id(segments[1])?;
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Payload)?;

    // bare numbers are valid JSON too, so only objects take the batched path
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        let values = map
            .iter()
            .filter_map(|(key, value)| Some((Variable::from_json_key(key)?, value.as_f64()?)))
            .collect();
        return Ok(Decoded::Json(JsonUpdate { module_id, values }));
    }

    let value: f64 = text.trim().parse().map_err(|_| DecodeError::Payload)?;
    if !value.is_finite() {
        return Err(DecodeError::NonFinite(value));
    }

    let variable = segments[2]
        .parse::<Variable>()
        .map_err(|_| DecodeError::UnknownSensor(segments[2].to_string()))?;

    Ok(Decoded::Scalar(ScalarUpdate {
        module_id,
        variable,
        value,
    }))
}

/// Normalize a module segment to `M<n>`
pub fn module_id(segment: &str) -> Result<String, DecodeError> {
    let number = MODULE_TOKEN
        .captures(segment)
        .and_then(|captures| captures[1].parse::<u32>().ok())
        .ok_or_else(|| DecodeError::ModuleToken(segment.to_string()))?;

    Ok(format!("M{number}"))
}
