//! Problem and device arbitration for the climate decision layer
//!
//! Classifies room conditions into problems, picks devices to switch off
//! and on, arbitrates between concurrently active scenarios and adapts
//! user preferences from history.

pub mod arbiter;
pub mod capability;
pub mod classifier;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod preference;
pub mod problem;
pub mod scheduler;
pub mod solver;
pub mod weather;

pub use config::EngineConfig;
pub use engine::{CycleOutcome, DecisionEngine, EngineEvent, HouseReport, RoomReport, Status};
pub use error::EngineError;
pub use freshness::FreshnessPolicy;
pub use problem::{Formulation, Problem};
pub use solver::{DeviceEfficiency, ScenarioPlan, Solution};
