//! Device instructions and instruction sets

use crate::ids::{DeviceId, RoomId, ScenarioId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Requested device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    On,
    Off,
}

impl TargetState {
    #[must_use]
    pub fn from_on(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

/// Directive to set one device to on/off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub device: DeviceId,
    pub target: TargetState,
}

impl Instruction {
    #[must_use]
    pub fn new(device: DeviceId, target: TargetState) -> Self {
        Self { device, target }
    }
}

/// Who produced an instruction set for a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum InstructionOwner {
    /// The ad-hoc problem solver
    Machine,
    /// A scheduled scenario
    Scenario(ScenarioId),
    /// The arbitrated result consumed by actuators
    Final,
}

impl fmt::Display for InstructionOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine => f.write_str("machine"),
            Self::Scenario(id) => write!(f, "scenario:{id}"),
            Self::Final => f.write_str("final"),
        }
    }
}

/// A set of instructions owned by a room and a producer
///
/// A device appears at most once: setting a device again overwrites its
/// previous target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionSet {
    /// Container identity, regenerated whenever a set is replaced
    pub id: Uuid,
    pub room: RoomId,
    pub owner: InstructionOwner,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    pub created_at: DateTime<Utc>,
}

impl InstructionSet {
    /// Create an empty set
    #[must_use]
    pub fn new(room: RoomId, owner: InstructionOwner) -> Self {
        Self {
            id: Uuid::new_v4(),
            room,
            owner,
            instructions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a set from instructions; later entries for a device win
    #[must_use]
    pub fn with_instructions(
        room: RoomId,
        owner: InstructionOwner,
        instructions: impl IntoIterator<Item = Instruction>,
    ) -> Self {
        let mut set = Self::new(room, owner);
        for instruction in instructions {
            set.set(instruction.device, instruction.target);
        }
        set
    }

    /// Set the target of a device, replacing any previous entry
    pub fn set(&mut self, device: DeviceId, target: TargetState) {
        match self.instructions.iter_mut().find(|i| i.device == device) {
            Some(existing) => existing.target = target,
            None => self.instructions.push(Instruction::new(device, target)),
        }
    }

    #[must_use]
    pub fn get(&self, device: &DeviceId) -> Option<TargetState> {
        self.instructions
            .iter()
            .find(|i| &i.device == device)
            .map(|i| i.target)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }
}
