//! Fact persistence using JSON file storage

use crate::device::{Device, DeviceClass};
use crate::house::{House, User};
use crate::ids::{RoomId, ScenarioId};
use crate::instruction::InstructionSet;
use crate::measurement::{Measurement, SensorReading};
use crate::scenario::Scenario;
use crate::state::{standard_opposites, OppositePair, RoomState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// A classified state stored for a room, optionally under a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRoomState {
    pub room: RoomId,
    #[serde(default)]
    pub scenario: Option<ScenarioId>,
    pub state: RoomState,
}

/// Everything the in-memory store holds, in serializable form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactSnapshot {
    #[serde(default)]
    pub houses: Vec<House>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub device_classes: Vec<DeviceClass>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default = "standard_opposites")]
    pub opposites: Vec<OppositePair>,
    #[serde(default)]
    pub readings: Vec<SensorReading>,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    #[serde(default)]
    pub room_states: Vec<StoredRoomState>,
    #[serde(default)]
    pub instruction_sets: Vec<InstructionSet>,
}

impl Default for FactSnapshot {
    fn default() -> Self {
        Self {
            houses: Vec::new(),
            users: Vec::new(),
            device_classes: Vec::new(),
            devices: Vec::new(),
            scenarios: Vec::new(),
            opposites: standard_opposites(),
            readings: Vec::new(),
            measurements: Vec::new(),
            room_states: Vec::new(),
            instruction_sets: Vec::new(),
        }
    }
}

/// Load a snapshot from a JSON file
pub async fn load_snapshot(path: &Path) -> FactSnapshot {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<FactSnapshot>(&contents) {
            Ok(snapshot) => {
                tracing::info!(
                    "Loaded {} houses, {} devices, {} scenarios from {:?}",
                    snapshot.houses.len(),
                    snapshot.devices.len(),
                    snapshot.scenarios.len(),
                    path
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!("Failed to parse facts file {:?}: {}", path, e);
                FactSnapshot::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No facts file found at {:?}, starting fresh", path);
            FactSnapshot::default()
        }
        Err(e) => {
            tracing::warn!("Failed to read facts file {:?}: {}", path, e);
            FactSnapshot::default()
        }
    }
}

/// Unique sibling of `path` so concurrent writers never share a temp file
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "facts".to_string(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4()))
}

/// Save a snapshot to a JSON file atomically
#[allow(clippy::missing_errors_doc)]
pub async fn save_snapshot(path: &Path, snapshot: &FactSnapshot) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Write to a temp file of our own, then rename over the old one
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, &json).await?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    tracing::debug!("Saved facts snapshot to {:?}", path);
    Ok(())
}
