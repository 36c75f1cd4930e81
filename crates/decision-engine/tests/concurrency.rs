mod common;

use chrono::{DateTime, Utc};
use climate_core::{
    Capabilities, Device, DeviceClass, DeviceClassId, DeviceId, FactStore, HistorySample, House,
    HouseId, InstructionOwner, InstructionSet, Measurement, MemoryStore, Parameter, Range,
    Revision, RoomId, RoomState, Scenario, ScenarioId, SensorReading, StateClass, StoreError,
    UserId,
};
use common::*;
use decision_engine::{CycleOutcome, DecisionEngine, EngineConfig, EngineError, Status};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory store that makes the next few instruction writes for one room
/// lose a race against an invisible writer
struct ConflictingStore {
    inner: MemoryStore,
    room: RoomId,
    pending: AtomicUsize,
}

impl ConflictingStore {
    fn new(inner: MemoryStore, room: &str, conflicts: usize) -> Self {
        Self {
            inner,
            room: RoomId::new(room),
            pending: AtomicUsize::new(conflicts),
        }
    }

    fn take_conflict(&self, room: &RoomId) -> bool {
        room == &self.room
            && self
                .pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

impl FactStore for ConflictingStore {
    fn houses(&self) -> Vec<House> {
        self.inner.houses()
    }

    fn get_house(&self, house: &HouseId) -> Option<House> {
        self.inner.get_house(house)
    }

    fn house_of_room(&self, room: &RoomId) -> Option<House> {
        self.inner.house_of_room(room)
    }

    fn get_range(&self, user: &UserId, parameter: Parameter) -> Option<Range> {
        self.inner.get_range(user, parameter)
    }

    fn set_range(
        &self,
        user: &UserId,
        parameter: Parameter,
        range: Range,
    ) -> Result<(), StoreError> {
        self.inner.set_range(user, parameter, range)
    }

    fn get_history(&self, user: &UserId, device: &DeviceId) -> Vec<HistorySample> {
        self.inner.get_history(user, device)
    }

    fn record_reading(&self, reading: SensorReading) {
        self.inner.record_reading(reading);
    }

    fn sensor_readings(&self, room: &RoomId, parameter: Parameter) -> Vec<f64> {
        self.inner.sensor_readings(room, parameter)
    }

    fn expire_readings(&self, room: &RoomId, before: DateTime<Utc>) -> usize {
        self.inner.expire_readings(room, before)
    }

    fn get_measurement(&self, room: &RoomId, parameter: Parameter) -> Option<f64> {
        self.inner.get_measurement(room, parameter)
    }

    fn put_measurement(&self, measurement: Measurement) {
        self.inner.put_measurement(measurement);
    }

    fn remove_measurement(&self, room: &RoomId, parameter: Parameter) -> Option<Measurement> {
        self.inner.remove_measurement(room, parameter)
    }

    fn get_room_state(&self, room: &RoomId) -> Option<RoomState> {
        self.inner.get_room_state(room)
    }

    fn put_room_state(&self, room: &RoomId, state: RoomState) {
        self.inner.put_room_state(room, state);
    }

    fn get_scenario_state(&self, scenario: &ScenarioId, room: &RoomId) -> Option<RoomState> {
        self.inner.get_scenario_state(scenario, room)
    }

    fn put_scenario_state(&self, scenario: &ScenarioId, room: &RoomId, state: RoomState) {
        self.inner.put_scenario_state(scenario, room, state);
    }

    fn devices(&self) -> Vec<Device> {
        self.inner.devices()
    }

    fn get_devices_in_room(&self, room: &RoomId) -> Vec<Device> {
        self.inner.get_devices_in_room(room)
    }

    fn get_device_capabilities(&self, device: &DeviceId) -> Option<Capabilities> {
        self.inner.get_device_capabilities(device)
    }

    fn is_device_on(&self, device: &DeviceId) -> Option<bool> {
        self.inner.is_device_on(device)
    }

    fn set_device_on(&self, device: &DeviceId, on: bool) -> Result<(), StoreError> {
        self.inner.set_device_on(device, on)
    }

    fn device_classes(&self) -> Vec<DeviceClass> {
        self.inner.device_classes()
    }

    fn set_class_capabilities(
        &self,
        class: &DeviceClassId,
        capabilities: Capabilities,
    ) -> Result<(), StoreError> {
        self.inner.set_class_capabilities(class, capabilities)
    }

    fn opposite_state(&self, state: StateClass) -> Option<StateClass> {
        self.inner.opposite_state(state)
    }

    fn scenarios(&self) -> Vec<Scenario> {
        self.inner.scenarios()
    }

    fn get_scenario(&self, scenario: &ScenarioId) -> Option<Scenario> {
        self.inner.get_scenario(scenario)
    }

    fn mark_scenario_recomputed(
        &self,
        scenario: &ScenarioId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.mark_scenario_recomputed(scenario, at)
    }

    fn room_revision(&self, room: &RoomId) -> Revision {
        self.inner.room_revision(room)
    }

    fn get_instruction_set(
        &self,
        room: &RoomId,
        owner: &InstructionOwner,
    ) -> Option<InstructionSet> {
        self.inner.get_instruction_set(room, owner)
    }

    fn instruction_sets(&self, room: &RoomId) -> Vec<InstructionSet> {
        self.inner.instruction_sets(room)
    }

    fn write_instruction_set(
        &self,
        set: InstructionSet,
        expected: Revision,
    ) -> Result<Revision, StoreError> {
        if self.take_conflict(&set.room) {
            return Err(StoreError::Conflict {
                room: set.room,
                expected,
                found: expected + 1,
            });
        }
        self.inner.write_instruction_set(set, expected)
    }

    fn delete_instruction_set(
        &self,
        room: &RoomId,
        owner: &InstructionOwner,
        expected: Revision,
    ) -> Result<Revision, StoreError> {
        self.inner.delete_instruction_set(room, owner, expected)
    }
}

fn hot_house(rooms: &[&str]) -> MemoryStore {
    let store = MemoryStore::new();
    seed_house(&store, rooms);
    seed_class(&store, "air_conditioner", vec![], vec![TEMP_HIGH]);
    for room in rooms {
        seed_device(&store, &format!("{room}-ac"), room, "air_conditioner", false);
        report(&store, room, 30.0, 50.0, 600.0);
    }
    store
}

fn detected(store: Arc<ConflictingStore>, room: &str) -> DecisionEngine {
    let engine = DecisionEngine::new(store, EngineConfig::default());
    engine.create_measurement(&RoomId::new(room));
    engine
        .detect_room_state(&HouseId::new("home"), &RoomId::new(room))
        .unwrap();
    engine
}

#[tokio::test]
async fn test_single_conflict_is_retried() {
    let store = Arc::new(ConflictingStore::new(hot_house(&["living"]), "living", 1));
    let engine = detected(store.clone(), "living");
    let room = RoomId::new("living");

    let outcome = engine.create_instructions(&room).await.unwrap();
    let set = outcome.written().unwrap();
    assert_eq!(set.owner, InstructionOwner::Machine);
    assert_eq!(set.len(), 1);
    assert_eq!(store.room_revision(&room), 1);
}

#[tokio::test]
async fn test_repeated_conflict_gives_up() {
    let store = Arc::new(ConflictingStore::new(hot_house(&["living"]), "living", 2));
    let engine = detected(store.clone(), "living");
    let room = RoomId::new("living");

    let result = engine.create_instructions(&room).await;
    assert!(matches!(result, Err(EngineError::StoreWriteConflict(r)) if r == room));
    assert!(store.instruction_sets(&room).is_empty());
    assert_eq!(store.room_revision(&room), 0);
}

#[tokio::test]
async fn test_conflicting_room_fails_alone() {
    let store = Arc::new(ConflictingStore::new(
        hot_house(&["living", "kitchen"]),
        "living",
        2,
    ));
    let engine = DecisionEngine::new(store.clone(), EngineConfig::default());

    let report = engine.run_house_cycle(&HouseId::new("home")).await.unwrap();
    assert_eq!(report.status(), Status::Error);

    let living = &report.rooms[0];
    assert_eq!(living.status, Status::Error);
    assert!(living.error.as_deref().unwrap().contains("living"));

    let kitchen = &report.rooms[1];
    assert_eq!(kitchen.status, Status::Ok);
    assert!(matches!(kitchen.outcome, Some(CycleOutcome::Written { .. })));
    let final_set = store
        .get_instruction_set(&RoomId::new("kitchen"), &InstructionOwner::Final)
        .unwrap();
    assert_eq!(final_set.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_serialize_per_room() {
    let store = Arc::new(ConflictingStore::new(hot_house(&["living"]), "living", 0));
    let engine = Arc::new(detected(store.clone(), "living"));
    let room = RoomId::new("living");

    let writers: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let room = room.clone();
            tokio::spawn(async move { engine.create_instructions(&room).await })
        })
        .collect();

    for writer in writers {
        let outcome = writer.await.unwrap().unwrap();
        assert!(outcome.written().is_some());
    }

    // every writer replaced the machine set exactly once
    assert_eq!(store.room_revision(&room), 16);
    let sets = store.instruction_sets(&room);
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].owner, InstructionOwner::Machine);
}
