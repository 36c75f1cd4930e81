//! The Fact Store abstraction
//!
//! The decision engine never talks to a knowledge graph directly. Every
//! read and write goes through typed operations on this trait, so the
//! arbitration algorithms stay independent of the storage and query
//! language behind it.

use crate::device::{Capabilities, Device, DeviceClass};
use crate::house::{HistorySample, House, Range};
use crate::ids::{DeviceClassId, DeviceId, HouseId, RoomId, ScenarioId, UserId};
use crate::instruction::{InstructionOwner, InstructionSet};
use crate::measurement::{Measurement, SensorReading};
use crate::scenario::Scenario;
use crate::state::{Parameter, RoomState, StateClass};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Monotonic per-room counter bumped on every instruction-set write
pub type Revision = u64;

/// Fact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another writer changed the room's instruction sets first
    #[error("Write conflict on room {room}: expected revision {expected}, found {found}")]
    Conflict {
        room: RoomId,
        expected: Revision,
        found: Revision,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Typed read/write operations over the facts the engine consumes
pub trait FactStore: Send + Sync {
    // Houses and users

    fn houses(&self) -> Vec<House>;

    fn get_house(&self, house: &HouseId) -> Option<House>;

    /// House containing a room
    fn house_of_room(&self, room: &RoomId) -> Option<House>;

    /// Preferred range of a user for a parameter
    fn get_range(&self, user: &UserId, parameter: Parameter) -> Option<Range>;

    /// Replace a user's preferred range
    fn set_range(&self, user: &UserId, parameter: Parameter, range: Range)
        -> Result<(), StoreError>;

    /// Conditions observed while the user ran a device
    fn get_history(&self, user: &UserId, device: &DeviceId) -> Vec<HistorySample>;

    // Sensors and measurements

    fn record_reading(&self, reading: SensorReading);

    /// All current readings of a parameter in a room
    fn sensor_readings(&self, room: &RoomId, parameter: Parameter) -> Vec<f64>;

    /// Drop a room's readings recorded before `before`; returns how many
    fn expire_readings(&self, room: &RoomId, before: DateTime<Utc>) -> usize;

    fn get_measurement(&self, room: &RoomId, parameter: Parameter) -> Option<f64>;

    /// Store a measurement, superseding the previous one
    fn put_measurement(&self, measurement: Measurement);

    fn remove_measurement(&self, room: &RoomId, parameter: Parameter) -> Option<Measurement>;

    // Classified states

    fn get_room_state(&self, room: &RoomId) -> Option<RoomState>;

    fn put_room_state(&self, room: &RoomId, state: RoomState);

    fn get_scenario_state(&self, scenario: &ScenarioId, room: &RoomId) -> Option<RoomState>;

    fn put_scenario_state(&self, scenario: &ScenarioId, room: &RoomId, state: RoomState);

    // Devices and capability model

    fn devices(&self) -> Vec<Device>;

    /// Devices located in a room, in stable enumeration order
    fn get_devices_in_room(&self, room: &RoomId) -> Vec<Device>;

    fn get_device_capabilities(&self, device: &DeviceId) -> Option<Capabilities>;

    fn is_device_on(&self, device: &DeviceId) -> Option<bool>;

    fn set_device_on(&self, device: &DeviceId, on: bool) -> Result<(), StoreError>;

    fn device_classes(&self) -> Vec<DeviceClass>;

    fn set_class_capabilities(
        &self,
        class: &DeviceClassId,
        capabilities: Capabilities,
    ) -> Result<(), StoreError>;

    /// The "is opposite to" relation of the capability model
    fn opposite_state(&self, state: StateClass) -> Option<StateClass>;

    // Scenarios

    fn scenarios(&self) -> Vec<Scenario>;

    fn get_scenario(&self, scenario: &ScenarioId) -> Option<Scenario>;

    fn mark_scenario_recomputed(
        &self,
        scenario: &ScenarioId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // Instruction sets

    /// Current revision of a room's instruction sets
    fn room_revision(&self, room: &RoomId) -> Revision;

    fn get_instruction_set(&self, room: &RoomId, owner: &InstructionOwner)
        -> Option<InstructionSet>;

    /// Every instruction set of a room
    fn instruction_sets(&self, room: &RoomId) -> Vec<InstructionSet>;

    /// Replace the set with the same room and owner in one step.
    ///
    /// Fails with `StoreError::Conflict` unless the room is still at
    /// `expected`. Returns the new revision.
    fn write_instruction_set(
        &self,
        set: InstructionSet,
        expected: Revision,
    ) -> Result<Revision, StoreError>;

    /// Remove a room's set for an owner under the same revision check
    fn delete_instruction_set(
        &self,
        room: &RoomId,
        owner: &InstructionOwner,
        expected: Revision,
    ) -> Result<Revision, StoreError>;
}
