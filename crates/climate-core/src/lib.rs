//! Climate fact layer
//!
//! This crate provides the shared vocabulary of the climate decision layer
//! (rooms, devices, state classes, instruction sets, scenarios) and the
//! `FactStore` abstraction the decision engine reads from and writes to.

pub mod device;
pub mod house;
pub mod ids;
pub mod instruction;
pub mod measurement;
pub mod memory;
pub mod persistence;
pub mod scenario;
pub mod state;
pub mod store;

pub use device::{Capabilities, Device, DeviceClass};
pub use house::{HistoryEntry, HistorySample, House, Preferences, Range, User};
pub use ids::{DeviceClassId, DeviceId, HouseId, RoomId, ScenarioId, SensorId, UserId};
pub use instruction::{Instruction, InstructionOwner, InstructionSet, TargetState};
pub use measurement::{Measurement, SensorReading};
pub use memory::MemoryStore;
pub use persistence::FactSnapshot;
pub use scenario::{Scenario, ScenarioTarget};
pub use state::{ClassifiedState, Level, Parameter, RoomState, StateClass};
pub use store::{FactStore, Revision, StoreError};
