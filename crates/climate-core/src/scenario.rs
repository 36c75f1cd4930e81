//! Scheduled scenarios

use crate::ids::{RoomId, ScenarioId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comfort target a scenario aims for in one room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTarget {
    pub room: RoomId,
    pub temperature: f64,
    pub humidity: f64,
}

/// A prioritized, time-boxed proposal of room conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    /// Voting weight when scenarios disagree on a device
    pub priority: i32,
    /// Window start in HH:MM format (24-hour)
    pub start: String,
    /// Window end in HH:MM format, exclusive (can wrap past midnight)
    pub finish: String,
    /// When the scenario's instructions were last recomputed
    #[serde(default)]
    pub last_recomputed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub targets: Vec<ScenarioTarget>,
}

impl Scenario {
    /// Target for a room, if the scenario covers it
    #[must_use]
    pub fn target_for(&self, room: &RoomId) -> Option<&ScenarioTarget> {
        self.targets.iter().find(|t| &t.room == room)
    }
}
