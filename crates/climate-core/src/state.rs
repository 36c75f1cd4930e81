//! Environmental state classes
//!
//! Every measured parameter is classified into a closed set of levels. A
//! `StateClass` (e.g. "temperature high") is the unit the capability model
//! talks about: devices cause and fix state classes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Raw deviation value meaning "no deviation recorded"
pub const UNKNOWN_DEVIATION: f64 = -1000.0;

/// Measured environmental parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Temperature,
    Humidity,
    Co2,
}

impl Parameter {
    /// All parameters in detection order
    pub const ALL: [Parameter; 3] = [Parameter::Temperature, Parameter::Humidity, Parameter::Co2];

    /// Short name used in state class names
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Humidity => "hum",
            Self::Co2 => "co2",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification level of a measured value against its acceptable range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Normal,
    High,
}

impl Level {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// A state category tagged with the parameter it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateClass {
    pub parameter: Parameter,
    pub level: Level,
}

impl StateClass {
    #[must_use]
    pub const fn new(parameter: Parameter, level: Level) -> Self {
        Self { parameter, level }
    }

    #[must_use]
    pub const fn normal(parameter: Parameter) -> Self {
        Self::new(parameter, Level::Normal)
    }

    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.level == Level::Normal
    }
}

impl fmt::Display for StateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.parameter.as_str(), self.level.as_str())
    }
}

/// A pair of state classes linked by the "is opposite to" relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OppositePair {
    pub state: StateClass,
    pub opposite: StateClass,
}

/// The low/high opposite relation for every parameter that has a low level
#[must_use]
pub fn standard_opposites() -> Vec<OppositePair> {
    let mut pairs = Vec::new();
    for parameter in [Parameter::Temperature, Parameter::Humidity] {
        let low = StateClass::new(parameter, Level::Low);
        let high = StateClass::new(parameter, Level::High);
        pairs.push(OppositePair {
            state: low,
            opposite: high,
        });
        pairs.push(OppositePair {
            state: high,
            opposite: low,
        });
    }
    pairs
}

/// A classified parameter together with its normalized deviation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedState {
    pub state: StateClass,
    /// Deviation from the violated boundary; `None` when normal or unknown
    #[serde(default, deserialize_with = "deserialize_deviation")]
    pub deviation: Option<f64>,
}

impl ClassifiedState {
    #[must_use]
    pub fn normal(parameter: Parameter) -> Self {
        Self {
            state: StateClass::normal(parameter),
            deviation: None,
        }
    }
}

/// The current classified state of a room (or of a room under a scenario)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomState {
    pub states: Vec<ClassifiedState>,
    pub detected_at: DateTime<Utc>,
}

impl RoomState {
    #[must_use]
    pub fn new(states: Vec<ClassifiedState>) -> Self {
        Self {
            states,
            detected_at: Utc::now(),
        }
    }

    /// Level currently recorded for a parameter
    #[must_use]
    pub fn level_of(&self, parameter: Parameter) -> Option<Level> {
        self.states
            .iter()
            .find(|s| s.state.parameter == parameter)
            .map(|s| s.state.level)
    }
}

/// Map the stored sentinel (or null) to `None`
fn deserialize_deviation<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| *v != UNKNOWN_DEVIATION))
}
