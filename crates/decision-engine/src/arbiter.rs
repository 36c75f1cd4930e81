//! Scenario priority arbitration
//!
//! Several scenarios can be actual for a room at once and propose
//! different targets for the same device. Devices with a single proposed
//! target take it directly; disputed devices are settled by comparing the
//! average priority of the "on" and "off" camps.

use climate_core::{
    DeviceId, Instruction, InstructionOwner, InstructionSet, RoomId, ScenarioId, TargetState,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Instructions one actual scenario proposes for a room
#[derive(Debug, Clone)]
pub struct ScenarioProposal {
    pub scenario: ScenarioId,
    pub priority: i32,
    pub instructions: Vec<Instruction>,
}

/// Priority totals of both camps for one disputed device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VoteTally {
    pub sum_on: i64,
    pub count_on: u32,
    pub sum_off: i64,
    pub count_off: u32,
}

impl VoteTally {
    pub fn add(&mut self, priority: i32, target: TargetState) {
        match target {
            TargetState::On => {
                self.sum_on += i64::from(priority);
                self.count_on += 1;
            }
            TargetState::Off => {
                self.sum_off += i64::from(priority);
                self.count_off += 1;
            }
        }
    }

    /// The strictly higher average priority wins "on"; ties go to "off"
    #[must_use]
    pub fn decide(&self) -> TargetState {
        if self.count_on == 0 {
            return TargetState::Off;
        }
        if self.count_off == 0 {
            return TargetState::On;
        }
        let avg_on = self.sum_on as f64 / f64::from(self.count_on);
        let avg_off = self.sum_off as f64 / f64::from(self.count_off);
        TargetState::from_on(avg_on > avg_off)
    }
}

struct Ballot {
    targets: HashSet<TargetState>,
    voters: Vec<(ScenarioId, i32, TargetState)>,
}

/// Resolve every device the scenarios mention to one target.
///
/// Output order follows the first mention of each device.
#[must_use]
pub fn resolve_votes(proposals: &[ScenarioProposal]) -> Vec<Instruction> {
    let mut order: Vec<DeviceId> = Vec::new();
    let mut ballots: HashMap<DeviceId, Ballot> = HashMap::new();

    for proposal in proposals {
        for instruction in &proposal.instructions {
            let ballot = ballots.entry(instruction.device.clone()).or_insert_with(|| {
                order.push(instruction.device.clone());
                Ballot {
                    targets: HashSet::new(),
                    voters: Vec::new(),
                }
            });
            ballot.targets.insert(instruction.target);
            ballot
                .voters
                .push((proposal.scenario.clone(), proposal.priority, instruction.target));
        }
    }

    order
        .into_iter()
        .filter_map(|device| {
            let ballot = ballots.remove(&device)?;
            let target = if ballot.targets.len() == 1 {
                ballot.voters.first().map(|(_, _, target)| *target)?
            } else {
                let tally = tally(&ballot.voters);
                tracing::debug!(
                    "Device {} disputed: on {}/{}, off {}/{}",
                    device,
                    tally.sum_on,
                    tally.count_on,
                    tally.sum_off,
                    tally.count_off
                );
                tally.decide()
            };
            Some(Instruction::new(device, target))
        })
        .collect()
}

/// Count each scenario once per device, keeping its first vote
fn tally(voters: &[(ScenarioId, i32, TargetState)]) -> VoteTally {
    let mut seen: HashSet<&ScenarioId> = HashSet::new();
    let mut tally = VoteTally::default();
    for (scenario, priority, target) in voters {
        if seen.insert(scenario) {
            tally.add(*priority, *target);
        }
    }
    tally
}

/// Merge machine instructions with scenario decisions.
///
/// Scenario decisions override the machine only for devices a scenario
/// mentions.
#[must_use]
pub fn merge(machine: &[Instruction], scenario: &[Instruction]) -> Vec<Instruction> {
    let decided: HashMap<&DeviceId, TargetState> =
        scenario.iter().map(|i| (&i.device, i.target)).collect();

    let mut merged: Vec<Instruction> = machine
        .iter()
        .map(|i| {
            let target = decided.get(&i.device).copied().unwrap_or(i.target);
            Instruction::new(i.device.clone(), target)
        })
        .collect();

    for instruction in scenario {
        if !machine.iter().any(|m| m.device == instruction.device) {
            merged.push(instruction.clone());
        }
    }
    merged
}

/// Build the final instruction set of a room
#[must_use]
pub fn arbitrate(
    room: &RoomId,
    machine: &[Instruction],
    proposals: &[ScenarioProposal],
) -> InstructionSet {
    let resolved = resolve_votes(proposals);
    InstructionSet::with_instructions(
        room.clone(),
        InstructionOwner::Final,
        merge(machine, &resolved),
    )
}
