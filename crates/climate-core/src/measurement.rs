//! Sensor readings and room measurements

use crate::ids::{RoomId, SensorId};
use crate::state::Parameter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single value reported by a sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor: SensorId,
    pub room: RoomId,
    pub parameter: Parameter,
    pub value: f64,
    /// When the value was reported; readers stamp it on arrival if absent
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl SensorReading {
    /// A reading reported now
    pub fn new(
        sensor: impl Into<SensorId>,
        room: impl Into<RoomId>,
        parameter: Parameter,
        value: f64,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            room: room.into(),
            parameter,
            value,
            recorded_at: Utc::now(),
        }
    }
}

/// The current measurement of one parameter in a room
///
/// A new measurement supersedes the previous one for the same room and
/// parameter; measurements are never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub room: RoomId,
    pub parameter: Parameter,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    #[must_use]
    pub fn now(room: RoomId, parameter: Parameter, value: f64) -> Self {
        Self {
            room,
            parameter,
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Arithmetic mean, `None` for an empty slice
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_without_timestamp_is_stamped() {
        let json = r#"{"sensor":"t1","room":"living","parameter":"temperature","value":21.5}"#;
        let before = Utc::now();
        let reading: SensorReading = serde_json::from_str(json).unwrap();
        assert!(reading.recorded_at >= before);
        assert_eq!(reading.value, 21.5);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[21.0]), Some(21.0));
        assert_eq!(mean(&[20.0, 22.0, 27.0]), Some(23.0));
    }
}
