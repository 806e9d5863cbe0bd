pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod assembler;
pub mod config;
pub mod decoder;
pub mod evaluator;
pub mod forwarder;
pub mod storage;
pub mod util;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the five environmental variables a module measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    Temperature,
    Humidity,
    Co,
    Co2,
    Ammonia,
}

impl Variable {
    pub const ALL: [Variable; 5] = [
        Variable::Temperature,
        Variable::Humidity,
        Variable::Co,
        Variable::Co2,
        Variable::Ammonia,
    ];

    /// Canonical name used in storage and on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::Humidity => "humidity",
            Variable::Co => "co",
            Variable::Co2 => "co2",
            Variable::Ammonia => "ammonia",
        }
    }

    /// Human readable name for alert messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Variable::Temperature => "Temperature",
            Variable::Humidity => "Humidity",
            Variable::Co => "CO",
            Variable::Co2 => "CO₂",
            Variable::Ammonia => "Ammonia",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Variable::Temperature => "°C",
            Variable::Humidity => "%",
            Variable::Co | Variable::Co2 | Variable::Ammonia => "ppm",
        }
    }

    /// Maps a key of the batched JSON firmware payload (`temp`, `hum`, `co`, `co2`, `nh3`)
    pub fn from_json_key(key: &str) -> Option<Variable> {
        match key {
            "temp" => Some(Variable::Temperature),
            "hum" => Some(Variable::Humidity),
            "co" => Some(Variable::Co),
            "co2" => Some(Variable::Co2),
            "nh3" => Some(Variable::Ammonia),
            _ => None,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variable: {0}")]
pub struct UnknownVariable(pub String);

impl FromStr for Variable {
    type Err = UnknownVariable;

    /// Accepts canonical names, the legacy topic suffixes and the Spanish
    /// column names still found in older deployments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temperatura" | "temp" => Ok(Variable::Temperature),
            "humidity" | "humedad" | "hum" => Ok(Variable::Humidity),
            "co" => Ok(Variable::Co),
            "co2" => Ok(Variable::Co2),
            "ammonia" | "amoniaco" | "nh3" => Ok(Variable::Ammonia),
            _ => Err(UnknownVariable(s.to_string())),
        }
    }
}

/// One observation set for one module at one instant
///
/// This is also the JSON body posted to the ingestion endpoint. Absent
/// values serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,

    /// Module identifier (format: "M<n>")
    pub module_id: String,

    pub captured_at: DateTime<Utc>,

    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co: Option<f64>,
    pub co2: Option<f64>,
    pub ammonia: Option<f64>,
}

impl Reading {
    /// Create an empty reading with a fresh id
    pub fn new(module_id: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            module_id: module_id.into(),
            captured_at,
            temperature: None,
            humidity: None,
            co: None,
            co2: None,
            ammonia: None,
        }
    }

    pub fn value(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::Temperature => self.temperature,
            Variable::Humidity => self.humidity,
            Variable::Co => self.co,
            Variable::Co2 => self.co2,
            Variable::Ammonia => self.ammonia,
        }
    }

    pub fn set(&mut self, variable: Variable, value: f64) {
        let slot = match variable {
            Variable::Temperature => &mut self.temperature,
            Variable::Humidity => &mut self.humidity,
            Variable::Co => &mut self.co,
            Variable::Co2 => &mut self.co2,
            Variable::Ammonia => &mut self.ammonia,
        };
        *slot = Some(value);
    }

    /// Present values in canonical variable order
    pub fn values(&self) -> impl Iterator<Item = (Variable, f64)> + '_ {
        Variable::ALL
            .into_iter()
            .filter_map(|variable| self.value(variable).map(|value| (variable, value)))
    }
}
