//! Houses, users and comfort preferences

use crate::ids::{DeviceId, HouseId, RoomId, UserId};
use crate::state::Parameter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An acceptable value range for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A user's comfort preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub temperature: Option<Range>,
    #[serde(default)]
    pub humidity: Option<Range>,
}

impl Preferences {
    /// Preferred range for a parameter (CO2 has a fixed limit, never a preference)
    #[must_use]
    pub fn get(&self, parameter: Parameter) -> Option<Range> {
        match parameter {
            Parameter::Temperature => self.temperature,
            Parameter::Humidity => self.humidity,
            Parameter::Co2 => None,
        }
    }

    /// Replace the range of a parameter, returning false for parameters without preferences
    pub fn set(&mut self, parameter: Parameter, range: Range) -> bool {
        match parameter {
            Parameter::Temperature => self.temperature = Some(range),
            Parameter::Humidity => self.humidity = Some(range),
            Parameter::Co2 => return false,
        }
        true
    }
}

/// Conditions observed while a user had a device running
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub temperature: f64,
    pub humidity: f64,
}

impl HistorySample {
    #[must_use]
    pub fn value(&self, parameter: Parameter) -> Option<f64> {
        match parameter {
            Parameter::Temperature => Some(self.temperature),
            Parameter::Humidity => Some(self.humidity),
            Parameter::Co2 => None,
        }
    }
}

/// A stored history entry tying a sample to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub device: DeviceId,
    #[serde(flatten)]
    pub sample: HistorySample,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// A user of the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A house with its rooms and owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct House {
    pub id: HouseId,
    #[serde(default)]
    pub name: Option<String>,
    pub owner: UserId,
    #[serde(default)]
    pub rooms: Vec<RoomId>,
    /// Location used to look up outdoor weather
    #[serde(default)]
    pub location: Option<String>,
}
