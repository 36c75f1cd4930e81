//! Greedy device arbitration
//!
//! The solver works in two phases. Phase A switches off running devices
//! that cause an open problem. Phase B walks the off devices ranked by a
//! `DeviceEfficiency` score and accepts each one that still resolves a
//! problem nobody else resolved. This is a greedy set-cover heuristic and
//! makes no optimality claim.

use crate::capability::DeviceView;
use crate::problem::{Formulation, Problem};
use climate_core::{DeviceId, Instruction, StateClass, TargetState};
use serde::Serialize;

/// Weight of one unit of solved deviation and of one harmful side effect
const SCORE_WEIGHT: f64 = 10.0;

/// How useful switching on a device would be this cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEfficiency {
    pub device: DeviceId,
    /// Open problems the device fixes, in problem order
    pub solved: Vec<StateClass>,
    pub score: f64,
}

impl DeviceEfficiency {
    /// Score a device against open problems.
    ///
    /// Every fixed open problem adds `10 * |coefficient|`. Every caused state
    /// that is not among the room's normal states subtracts 10.
    #[must_use]
    pub fn evaluate(device: &DeviceView, problems: &[Problem], normals: &[StateClass]) -> Self {
        let mut efficiency = Self::coverage(device, problems);
        let penalties = device
            .capabilities
            .causes
            .iter()
            .filter(|caused| !normals.contains(*caused))
            .count();
        efficiency.score -= SCORE_WEIGHT * penalties as f64;
        efficiency
    }

    /// Score a device by solved problems only
    #[must_use]
    pub fn coverage(device: &DeviceView, problems: &[Problem]) -> Self {
        let mut solved = Vec::new();
        let mut score = 0.0;
        for problem in problems {
            if device.fixes(&problem.state) {
                solved.push(problem.state);
                score += SCORE_WEIGHT * problem.priority();
            }
        }
        Self {
            device: device.device.clone(),
            solved,
            score,
        }
    }

    #[must_use]
    pub fn solves_anything(&self) -> bool {
        !self.solved.is_empty()
    }
}

/// Devices to switch off and on for one room
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Solution {
    pub disable: Vec<DeviceId>,
    pub enable: Vec<DeviceId>,
}

impl Solution {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disable.is_empty() && self.enable.is_empty()
    }

    /// Off instructions first, then on instructions
    #[must_use]
    pub fn instructions(&self) -> Vec<Instruction> {
        self.disable
            .iter()
            .map(|d| Instruction::new(d.clone(), TargetState::Off))
            .chain(
                self.enable
                    .iter()
                    .map(|d| Instruction::new(d.clone(), TargetState::On)),
            )
            .collect()
    }
}

/// Phase A: running devices that cause an open problem.
///
/// Returns the devices to switch off and the problems left for Phase B.
#[must_use]
pub fn conflict_enabled_devices(
    devices: &[DeviceView],
    problems: &[Problem],
) -> (Vec<DeviceId>, Vec<Problem>) {
    let mut remaining = problems.to_vec();
    let mut disable = Vec::new();

    for device in devices.iter().filter(|d| d.on) {
        if remaining.is_empty() {
            break;
        }
        let before = remaining.len();
        remaining.retain(|p| !device.causes(&p.state));
        if remaining.len() < before {
            disable.push(device.device.clone());
        }
    }

    (disable, remaining)
}

/// Phase B: switched-off devices that resolve the remaining problems
#[must_use]
pub fn solving_devices(
    devices: &[DeviceView],
    problems: &[Problem],
    normals: &[StateClass],
) -> Vec<DeviceId> {
    let mut candidates: Vec<DeviceEfficiency> = devices
        .iter()
        .filter(|d| !d.on)
        .map(|d| DeviceEfficiency::evaluate(d, problems, normals))
        .filter(DeviceEfficiency::solves_anything)
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut remaining: Vec<StateClass> = problems.iter().map(|p| p.state).collect();
    let mut accepted = Vec::new();

    for candidate in candidates {
        if remaining.is_empty() {
            break;
        }
        let before = remaining.len();
        remaining.retain(|s| !candidate.solved.contains(s));
        if remaining.len() < before {
            accepted.push(candidate.device);
        }
    }

    accepted
}

/// Run both phases for one room
#[must_use]
pub fn solve(devices: &[DeviceView], formulation: &Formulation) -> Solution {
    let (disable, remaining) = conflict_enabled_devices(devices, &formulation.problems);
    if remaining.is_empty() {
        return Solution {
            disable,
            enable: Vec::new(),
        };
    }

    let enable = solving_devices(devices, &remaining, &formulation.normals);
    Solution { disable, enable }
}

/// What a scenario proposes for a room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "devices", rename_all = "snake_case")]
pub enum ScenarioPlan {
    /// Nothing to change
    Idle,
    /// Switch off running devices that cause open problems
    DisableConflicting(Vec<DeviceId>),
    /// One device covers every problem
    MainDevice(DeviceId),
    /// Vetoed greedy selection
    Solving(Vec<DeviceId>),
}

impl ScenarioPlan {
    #[must_use]
    pub fn instructions(&self) -> Vec<Instruction> {
        match self {
            Self::Idle => Vec::new(),
            Self::DisableConflicting(devices) => devices
                .iter()
                .map(|d| Instruction::new(d.clone(), TargetState::Off))
                .collect(),
            Self::MainDevice(device) => vec![Instruction::new(device.clone(), TargetState::On)],
            Self::Solving(devices) => devices
                .iter()
                .map(|d| Instruction::new(d.clone(), TargetState::On))
                .collect(),
        }
    }
}

/// First device, in enumeration order, whose fixes cover every problem
#[must_use]
pub fn main_device<'a>(devices: &'a [DeviceView], problems: &[Problem]) -> Option<&'a DeviceView> {
    if problems.is_empty() {
        return None;
    }
    devices
        .iter()
        .find(|d| d.fixes_all(problems.iter().map(|p| &p.state)))
}

/// Greedy walk with hard vetoes.
///
/// A device is skipped when it fixes a state of a parameter that is
/// currently normal, when it conflicts with a device already accepted, or
/// when it resolves nothing still open.
#[must_use]
pub fn vetoed_solving_devices(devices: &[DeviceView], formulation: &Formulation) -> Vec<DeviceId> {
    let problems = &formulation.problems;
    let mut candidates: Vec<(&DeviceView, DeviceEfficiency)> = devices
        .iter()
        .map(|d| (d, DeviceEfficiency::coverage(d, problems)))
        .collect();
    candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));

    let mut remaining: Vec<StateClass> = problems.iter().map(|p| p.state).collect();
    let mut accepted: Vec<&DeviceView> = Vec::new();

    for (device, efficiency) in candidates {
        if remaining.is_empty() {
            break;
        }
        if touches_normal_parameter(device, formulation) {
            continue;
        }
        if accepted.iter().any(|a| a.conflicts_with(device)) {
            continue;
        }
        let before = remaining.len();
        remaining.retain(|s| !efficiency.solved.contains(s));
        if remaining.len() < before {
            accepted.push(device);
        }
    }

    accepted.into_iter().map(|d| d.device.clone()).collect()
}

fn touches_normal_parameter(device: &DeviceView, formulation: &Formulation) -> bool {
    device
        .capabilities
        .fixes
        .iter()
        .any(|fixed| formulation.is_normal(&StateClass::normal(fixed.parameter)))
}

/// Scenario variant of the solver
#[must_use]
pub fn solve_scenario(devices: &[DeviceView], formulation: &Formulation) -> ScenarioPlan {
    let problems = &formulation.problems;
    if problems.is_empty() {
        return ScenarioPlan::Idle;
    }

    let conflicting: Vec<DeviceId> = devices
        .iter()
        .filter(|d| d.on && d.capabilities.causes.iter().any(|c| formulation.is_open(c)))
        .map(|d| d.device.clone())
        .collect();
    if !conflicting.is_empty() {
        return ScenarioPlan::DisableConflicting(conflicting);
    }

    if let Some(device) = main_device(devices, problems) {
        return ScenarioPlan::MainDevice(device.device.clone());
    }

    let solving = vetoed_solving_devices(devices, formulation);
    if solving.is_empty() {
        ScenarioPlan::Idle
    } else {
        ScenarioPlan::Solving(solving)
    }
}
