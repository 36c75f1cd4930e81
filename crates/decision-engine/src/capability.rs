//! Device capability model as seen by the solver

use climate_core::{Capabilities, Device, DeviceId, FactStore, RoomId, StateClass};
use serde::Serialize;

/// A device with its current state and capability edges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub device: DeviceId,
    pub on: bool,
    pub capabilities: Capabilities,
}

impl DeviceView {
    #[must_use]
    pub fn new(device: impl Into<DeviceId>, on: bool, capabilities: Capabilities) -> Self {
        Self {
            device: device.into(),
            on,
            capabilities,
        }
    }

    #[must_use]
    pub fn causes(&self, state: &StateClass) -> bool {
        self.capabilities.causes.contains(state)
    }

    #[must_use]
    pub fn fixes(&self, state: &StateClass) -> bool {
        self.capabilities.fixes.contains(state)
    }

    /// Whether the device fixes every given state
    #[must_use]
    pub fn fixes_all<'a>(&self, mut states: impl Iterator<Item = &'a StateClass>) -> bool {
        states.all(|s| self.fixes(s))
    }

    /// Two devices conflict when they fix different levels of one parameter
    #[must_use]
    pub fn conflicts_with(&self, other: &DeviceView) -> bool {
        self.capabilities.fixes.iter().any(|mine| {
            other
                .capabilities
                .fixes
                .iter()
                .any(|theirs| theirs.parameter == mine.parameter && theirs.level != mine.level)
        })
    }
}

/// Load the devices of a room with their capability edges.
///
/// Devices without a known class get no edges, so the solver ignores them.
pub fn room_devices(store: &dyn FactStore, room: &RoomId) -> Vec<DeviceView> {
    store
        .get_devices_in_room(room)
        .into_iter()
        .map(|device| view_of(store, device))
        .collect()
}

fn view_of(store: &dyn FactStore, device: Device) -> DeviceView {
    let on = store.is_device_on(&device.id).unwrap_or(device.state_on);
    let capabilities = store.get_device_capabilities(&device.id).unwrap_or_else(|| {
        tracing::debug!("Device {} has no capabilities", device.display_name());
        Capabilities::default()
    });
    DeviceView {
        device: device.id,
        on,
        capabilities,
    }
}
