//! Core decision engine
//!
//! Ties detection, solving and arbitration to the fact store. Every write
//! of a room's instruction sets happens under that room's lock and the
//! store's revision check, so "drop the old set, write the new one" is
//! never interleaved with another writer for the same room.

use crate::arbiter::{self, ScenarioProposal};
use crate::capability::room_devices;
use crate::config::EngineConfig;
use crate::detection;
use crate::error::EngineError;
use crate::preference::{self, ParameterOutcome};
use crate::problem::formulate;
use crate::scheduler::{ScheduledJob, Scheduler};
use crate::solver::{solve, solve_scenario};
use crate::weather::{self, WeatherUpdate};
use chrono::Utc;
use climate_core::{
    ClassifiedState, DeviceId, FactStore, House, HouseId, Instruction, InstructionOwner,
    InstructionSet, Level, Measurement, Parameter, RoomId, RoomState, Scenario, ScenarioId,
    SensorReading, StoreError, UserId,
};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Events emitted by the decision engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A sensor reported a value
    ReadingRecorded { room: RoomId, parameter: Parameter },
    /// A room was classified
    RoomStateDetected {
        room: RoomId,
        states: Vec<ClassifiedState>,
    },
    /// An instruction set replaced its predecessor
    InstructionsWritten {
        room: RoomId,
        owner: InstructionOwner,
        instructions: Vec<Instruction>,
    },
    /// A room's cycle stopped early
    RoomSkipped { room: RoomId, reason: String },
    /// A house detection cycle completed
    HouseCycleFinished {
        house: HouseId,
        rooms: usize,
        failed: usize,
    },
    /// A scenario produced proposals for its rooms
    ScenarioEvaluated { scenario: ScenarioId, rooms: usize },
    /// A scheduled scenario tick completed
    ScenarioTickFinished { scenarios: usize },
    /// A user's preferences moved
    PreferencesAdapted { user: UserId, device: DeviceId },
    /// Weather-dependent devices were updated
    WeatherApplied { house: HouseId, outdoor: Level },
    /// A device was switched
    DeviceStateChanged { device: DeviceId, on: bool },
}

/// Result of one room-level cycle
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A new instruction set replaced the previous one
    Written { set: InstructionSet },
    /// Nothing was written this cycle
    NoOp { reason: String },
}

impl CycleOutcome {
    #[must_use]
    pub fn written(&self) -> Option<&InstructionSet> {
        match self {
            Self::Written { set } => Some(set),
            Self::NoOp { .. } => None,
        }
    }
}

/// Whether a step succeeded, as reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
}

/// Per-room result inside a house cycle or scenario evaluation
#[derive(Debug, Clone, Serialize)]
pub struct RoomReport {
    pub room: RoomId,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CycleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoomReport {
    fn from_result(room: RoomId, result: Result<CycleOutcome, EngineError>) -> Self {
        match result {
            Ok(outcome) => Self {
                room,
                status: Status::Ok,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                room,
                status: Status::Error,
                outcome: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HouseReport {
    pub house: HouseId,
    pub rooms: Vec<RoomReport>,
}

impl HouseReport {
    #[must_use]
    pub fn status(&self) -> Status {
        if self.rooms.iter().all(|r| r.status == Status::Ok) {
            Status::Ok
        } else {
            Status::Error
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: ScenarioId,
    /// False when the scenario was outside its window and not evaluated
    pub actual: bool,
    pub rooms: Vec<RoomReport>,
}

/// The main decision engine
pub struct DecisionEngine {
    store: Arc<dyn FactStore>,
    config: EngineConfig,
    /// One lock per room guarding its instruction sets
    room_locks: DashMap<RoomId, Arc<Mutex<()>>>,
    /// Time-based scheduler
    scheduler: Arc<Scheduler>,
    /// Event broadcaster
    event_tx: broadcast::Sender<EngineEvent>,
}

impl DecisionEngine {
    /// Create a new engine over a fact store
    #[must_use]
    pub fn new(store: Arc<dyn FactStore>, config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            store,
            config,
            room_locks: DashMap::new(),
            scheduler: Arc::new(Scheduler::new()),
            event_tx,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to engine events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    fn room_lock(&self, room: &RoomId) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Replace one of a room's instruction sets.
    ///
    /// `compute` rebuilds the set from the store; on a revision conflict it
    /// runs once more from scratch before giving up.
    async fn replace_set<F>(&self, room: &RoomId, compute: F) -> Result<InstructionSet, EngineError>
    where
        F: Fn(&dyn FactStore) -> Result<InstructionSet, EngineError>,
    {
        let lock = self.room_lock(room);
        let _guard = lock.lock().await;

        for attempt in 1..=2 {
            let revision = self.store.room_revision(room);
            let set = compute(self.store.as_ref())?;
            match self.store.write_instruction_set(set.clone(), revision) {
                Ok(_) => {
                    self.emit(EngineEvent::InstructionsWritten {
                        room: room.clone(),
                        owner: set.owner.clone(),
                        instructions: set.instructions.clone(),
                    });
                    return Ok(set);
                }
                Err(StoreError::Conflict {
                    expected, found, ..
                }) => {
                    tracing::warn!(
                        "Write conflict on {} (attempt {}): expected revision {}, found {}",
                        room,
                        attempt,
                        expected,
                        found
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!("Giving up on instruction write for {}", room);
        Err(EngineError::StoreWriteConflict(room.clone()))
    }

    /// Turn soft failures into a no-op, emitting a skip event
    fn settle(
        &self,
        room: &RoomId,
        result: Result<InstructionSet, EngineError>,
    ) -> Result<CycleOutcome, EngineError> {
        match result {
            Ok(set) => Ok(CycleOutcome::Written { set }),
            Err(e) if e.is_soft() => {
                tracing::warn!("Skipping room {}: {}", room, e);
                self.emit(EngineEvent::RoomSkipped {
                    room: room.clone(),
                    reason: e.to_string(),
                });
                Ok(CycleOutcome::NoOp {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    // Sensing

    /// Record a sensor reading
    pub fn record_reading(&self, reading: SensorReading) {
        let event = EngineEvent::ReadingRecorded {
            room: reading.room.clone(),
            parameter: reading.parameter,
        };
        self.store.record_reading(reading);
        self.emit(event);
    }

    /// Average current readings into measurements for a room.
    ///
    /// Readings older than the configured maximum age are dropped first.
    pub fn create_measurement(&self, room: &RoomId) -> Vec<Measurement> {
        if let Some(max_age) = self.config.reading_max_age() {
            let expired = self.store.expire_readings(room, Utc::now() - max_age);
            if expired > 0 {
                tracing::info!("Expired {} stale readings in {}", expired, room);
            }
        }
        detection::create_measurements(self.store.as_ref(), room)
    }

    /// Classify a room against its house owner's preferences
    pub fn detect_room_state(
        &self,
        house: &HouseId,
        room: &RoomId,
    ) -> Result<RoomState, EngineError> {
        let house = self
            .store
            .get_house(house)
            .ok_or_else(|| EngineError::MissingFact(format!("house {house}")))?;
        let state = detection::detect_room_state(self.store.as_ref(), &house, room)?;
        self.emit(EngineEvent::RoomStateDetected {
            room: room.clone(),
            states: state.states.clone(),
        });
        Ok(state)
    }

    // Solving

    /// Run the ad-hoc solver for a room and store its machine set
    pub async fn create_instructions(&self, room: &RoomId) -> Result<CycleOutcome, EngineError> {
        let result = self
            .replace_set(room, |store| {
                let state = store
                    .get_room_state(room)
                    .ok_or_else(|| EngineError::MissingFact(format!("state of room {room}")))?;
                let formulation = formulate(&state.states)?;
                let devices = room_devices(store, room);
                let solution = solve(&devices, &formulation);
                tracing::debug!(
                    "Room {}: {} problems, disable {:?}, enable {:?}",
                    room,
                    formulation.problems.len(),
                    solution.disable,
                    solution.enable
                );
                Ok(InstructionSet::with_instructions(
                    room.clone(),
                    InstructionOwner::Machine,
                    solution.instructions(),
                ))
            })
            .await;
        self.settle(room, result)
    }

    fn scenario_is_actual(&self, scenario: &Scenario) -> bool {
        match self.config.freshness.is_actual(scenario) {
            Ok(actual) => actual,
            Err(e) => {
                tracing::warn!("Scenario {} ignored: {}", scenario.id, e);
                false
            }
        }
    }

    /// Compute a scenario's state and proposals for each of its rooms
    pub async fn evaluate_scenario(
        &self,
        scenario: &ScenarioId,
    ) -> Result<ScenarioReport, EngineError> {
        let scenario = self
            .store
            .get_scenario(scenario)
            .ok_or_else(|| EngineError::MissingFact(format!("scenario {scenario}")))?;

        if self.config.freshness.gates_evaluation() && !self.scenario_is_actual(&scenario) {
            tracing::debug!("Scenario {} is not actual, skipping", scenario.id);
            return Ok(ScenarioReport {
                scenario: scenario.id,
                actual: false,
                rooms: Vec::new(),
            });
        }

        let mut rooms = Vec::with_capacity(scenario.targets.len());
        for target in &scenario.targets {
            let result = self.propose_for_room(&scenario, &target.room).await;
            rooms.push(RoomReport::from_result(target.room.clone(), result));
        }

        self.store
            .mark_scenario_recomputed(&scenario.id, Utc::now())?;
        self.emit(EngineEvent::ScenarioEvaluated {
            scenario: scenario.id.clone(),
            rooms: rooms.len(),
        });
        tracing::info!("Evaluated scenario {} for {} rooms", scenario.id, rooms.len());

        Ok(ScenarioReport {
            scenario: scenario.id,
            actual: true,
            rooms,
        })
    }

    async fn propose_for_room(
        &self,
        scenario: &Scenario,
        room: &RoomId,
    ) -> Result<CycleOutcome, EngineError> {
        let result = self
            .replace_set(room, |store| {
                let state = detection::detect_scenario_state(store, scenario, room)?;
                let formulation = formulate(&state.states)?;
                let plan = solve_scenario(&room_devices(store, room), &formulation);
                tracing::debug!("Scenario {} plan for {}: {:?}", scenario.id, room, plan);
                Ok(InstructionSet::with_instructions(
                    room.clone(),
                    InstructionOwner::Scenario(scenario.id.clone()),
                    plan.instructions(),
                ))
            })
            .await;
        self.settle(room, result)
    }

    /// Arbitrate machine and scenario sets into the room's final set
    pub async fn finalize_room(&self, room: &RoomId) -> Result<CycleOutcome, EngineError> {
        let actual: Vec<Scenario> = self
            .store
            .scenarios()
            .into_iter()
            .filter(|s| self.scenario_is_actual(s))
            .collect();

        let result = self
            .replace_set(room, |store| {
                let machine = store
                    .get_instruction_set(room, &InstructionOwner::Machine)
                    .map(|set| set.instructions)
                    .unwrap_or_default();
                let proposals: Vec<ScenarioProposal> = actual
                    .iter()
                    .filter_map(|scenario| {
                        let owner = InstructionOwner::Scenario(scenario.id.clone());
                        store
                            .get_instruction_set(room, &owner)
                            .map(|set| ScenarioProposal {
                                scenario: scenario.id.clone(),
                                priority: scenario.priority,
                                instructions: set.instructions,
                            })
                    })
                    .collect();
                tracing::debug!(
                    "Finalizing {} with {} machine instructions and {} scenario proposals",
                    room,
                    machine.len(),
                    proposals.len()
                );
                Ok(arbiter::arbitrate(room, &machine, &proposals))
            })
            .await;
        self.settle(room, result)
    }

    /// Measurement, state, instructions and final set for one room
    async fn run_room_cycle(
        &self,
        house: &House,
        room: &RoomId,
    ) -> Result<CycleOutcome, EngineError> {
        self.create_measurement(room);

        match detection::detect_room_state(self.store.as_ref(), house, room) {
            Ok(state) => self.emit(EngineEvent::RoomStateDetected {
                room: room.clone(),
                states: state.states,
            }),
            Err(e) if e.is_soft() => {
                return self.settle(room, Err(e));
            }
            Err(e) => return Err(e),
        }

        if let CycleOutcome::NoOp { reason } = self.create_instructions(room).await? {
            return Ok(CycleOutcome::NoOp { reason });
        }
        self.finalize_room(room).await
    }

    /// Run the detection cycle for every room of a house.
    ///
    /// A failure in one room never stops the others.
    pub async fn run_house_cycle(&self, house: &HouseId) -> Result<HouseReport, EngineError> {
        let house = self
            .store
            .get_house(house)
            .ok_or_else(|| EngineError::MissingFact(format!("house {house}")))?;
        tracing::info!("Detection cycle for {} ({} rooms)", house.id, house.rooms.len());

        let mut rooms = Vec::with_capacity(house.rooms.len());
        for room in &house.rooms {
            let result = self.run_room_cycle(&house, room).await;
            if let Err(e) = &result {
                tracing::error!("Cycle failed for room {}: {}", room, e);
            }
            rooms.push(RoomReport::from_result(room.clone(), result));
        }

        let report = HouseReport {
            house: house.id.clone(),
            rooms,
        };
        let failed = report
            .rooms
            .iter()
            .filter(|r| r.status == Status::Error)
            .count();
        self.emit(EngineEvent::HouseCycleFinished {
            house: house.id,
            rooms: report.rooms.len(),
            failed,
        });
        Ok(report)
    }

    /// Evaluate every scenario, then finalize every room of every house
    pub async fn run_scenario_tick(&self) -> Result<(), EngineError> {
        let scenarios = self.store.scenarios();
        for scenario in &scenarios {
            if let Err(e) = self.evaluate_scenario(&scenario.id).await {
                tracing::error!("Scenario {} failed: {}", scenario.id, e);
            }
        }

        for house in self.store.houses() {
            for room in &house.rooms {
                if let Err(e) = self.finalize_room(room).await {
                    tracing::error!("Finalizing room {} failed: {}", room, e);
                }
            }
        }

        self.emit(EngineEvent::ScenarioTickFinished {
            scenarios: scenarios.len(),
        });
        Ok(())
    }

    // Preferences, weather and devices

    /// Adapt a user's ranges from their history with a device
    pub fn adapt_preferences(
        &self,
        user: &UserId,
        device: &DeviceId,
    ) -> Result<Vec<ParameterOutcome>, EngineError> {
        let outcomes = preference::adapt_preferences(self.store.as_ref(), user, device)?;
        if outcomes
            .iter()
            .any(|o| matches!(o, ParameterOutcome::Adapted { .. }))
        {
            self.emit(EngineEvent::PreferencesAdapted {
                user: user.clone(),
                device: device.clone(),
            });
        }
        Ok(outcomes)
    }

    /// Rewrite weather-dependent capabilities from an outdoor temperature
    pub fn apply_weather(
        &self,
        house: &HouseId,
        outdoor_temperature: f64,
    ) -> Result<WeatherUpdate, EngineError> {
        let house = self
            .store
            .get_house(house)
            .ok_or_else(|| EngineError::MissingFact(format!("house {house}")))?;
        let update = weather::apply_weather(self.store.as_ref(), &house, outdoor_temperature)?;
        self.emit(EngineEvent::WeatherApplied {
            house: house.id,
            outdoor: update.outdoor,
        });
        Ok(update)
    }

    /// Record a device's actual on/off state
    pub fn set_device_state(&self, device: &DeviceId, on: bool) -> Result<(), EngineError> {
        self.store.set_device_on(device, on)?;
        self.emit(EngineEvent::DeviceStateChanged {
            device: device.clone(),
            on,
        });
        Ok(())
    }

    // Scheduling

    /// Register schedule jobs and start reacting to them
    pub fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        for house in self.store.houses() {
            self.scheduler.schedule_interval(
                ScheduledJob::Detection(house.id),
                self.config.detection_interval_secs,
            );
        }
        self.scheduler
            .schedule_cron(ScheduledJob::ScenarioTick, &self.config.scenario_cron)?;

        self.start_scheduler_listener();
        Ok(())
    }

    /// Start listening for scheduler events
    fn start_scheduler_listener(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let mut rx = self.scheduler.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => engine.handle_job(event.job).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Scheduler listener lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Scheduler event channel closed");
                        break;
                    }
                }
            }
        });
    }

    async fn handle_job(&self, job: ScheduledJob) {
        let result = match &job {
            ScheduledJob::Detection(house) => self.run_house_cycle(house).await.map(|_| ()),
            ScheduledJob::ScenarioTick => self.run_scenario_tick().await,
        };
        if let Err(e) = result {
            tracing::error!("Scheduled job {} failed: {}", job.key(), e);
        }
    }
}
