//! Device and device class representation

use crate::ids::{DeviceClassId, DeviceId, RoomId};
use crate::state::{Parameter, StateClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Capability edges of a device class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// States the device produces as a side effect while on
    #[serde(default)]
    pub causes: BTreeSet<StateClass>,
    /// States the device resolves while on
    #[serde(default)]
    pub fixes: BTreeSet<StateClass>,
}

impl Capabilities {
    #[must_use]
    pub fn new(
        causes: impl IntoIterator<Item = StateClass>,
        fixes: impl IntoIterator<Item = StateClass>,
    ) -> Self {
        Self {
            causes: causes.into_iter().collect(),
            fixes: fixes.into_iter().collect(),
        }
    }

    /// First fixed state belonging to a parameter
    #[must_use]
    pub fn fixed_state_for(&self, parameter: Parameter) -> Option<StateClass> {
        self.fixes.iter().copied().find(|s| s.parameter == parameter)
    }

    /// Drop every edge that belongs to a parameter
    pub fn clear_parameter(&mut self, parameter: Parameter) {
        self.causes.retain(|s| s.parameter != parameter);
        self.fixes.retain(|s| s.parameter != parameter);
    }
}

/// A class of devices ("air conditioner", "humidifier") owning capability edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceClass {
    pub id: DeviceClassId,
    pub name: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Capabilities follow the outdoor weather (e.g. an opened window)
    #[serde(default)]
    pub weather_dependent: bool,
}

/// A device located in a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// User-assigned friendly name
    #[serde(default)]
    pub name: Option<String>,
    pub room: RoomId,
    pub class: DeviceClassId,
    /// Current on/off state
    #[serde(default)]
    pub state_on: bool,
}

impl Device {
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, room: impl Into<RoomId>, class: impl Into<DeviceClassId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            room: room.into(),
            class: class.into(),
            state_on: false,
        }
    }

    /// Get a display name (friendly name or identifier)
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}
