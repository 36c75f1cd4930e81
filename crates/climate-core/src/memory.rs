//! In-memory fact store

use crate::device::{Capabilities, Device, DeviceClass};
use crate::house::{HistorySample, House, Range, User};
use crate::ids::{DeviceClassId, DeviceId, HouseId, RoomId, ScenarioId, UserId};
use crate::instruction::{InstructionOwner, InstructionSet};
use crate::measurement::{Measurement, SensorReading};
use crate::persistence::{self, FactSnapshot, StoredRoomState};
use crate::scenario::Scenario;
use crate::state::{OppositePair, Parameter, RoomState, StateClass};
use crate::store::{FactStore, Revision, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Instruction sets of one room plus the revision guarding them
#[derive(Debug, Default)]
struct RoomInstructions {
    revision: Revision,
    sets: Vec<InstructionSet>,
}

/// A `FactStore` kept in concurrent maps, optionally backed by a JSON file
///
/// Listings are ordered by identifier so enumeration order is stable
/// across calls.
pub struct MemoryStore {
    houses: DashMap<HouseId, House>,
    users: DashMap<UserId, User>,
    classes: DashMap<DeviceClassId, DeviceClass>,
    devices: DashMap<DeviceId, Device>,
    scenarios: DashMap<ScenarioId, Scenario>,
    opposites: DashMap<StateClass, StateClass>,
    /// Latest reading per sensor, keyed by room and parameter
    readings: DashMap<(RoomId, Parameter), Vec<SensorReading>>,
    measurements: DashMap<(RoomId, Parameter), Measurement>,
    room_states: DashMap<RoomId, RoomState>,
    scenario_states: DashMap<(ScenarioId, RoomId), RoomState>,
    instructions: DashMap<RoomId, RoomInstructions>,
    /// Path to the snapshot file for persistence
    data_path: Option<PathBuf>,
    /// Held while a snapshot is captured and written
    save_lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_snapshot(FactSnapshot::default())
    }
}

impl MemoryStore {
    /// Create an empty store with the standard opposite relation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a snapshot file, loading it if present
    pub async fn open(data_path: PathBuf) -> Self {
        let snapshot = persistence::load_snapshot(&data_path).await;
        let mut store = Self::from_snapshot(snapshot);
        store.data_path = Some(data_path);
        store
    }

    /// Build a store from a snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: FactSnapshot) -> Self {
        let store = Self {
            houses: DashMap::new(),
            users: DashMap::new(),
            classes: DashMap::new(),
            devices: DashMap::new(),
            scenarios: DashMap::new(),
            opposites: DashMap::new(),
            readings: DashMap::new(),
            measurements: DashMap::new(),
            room_states: DashMap::new(),
            scenario_states: DashMap::new(),
            instructions: DashMap::new(),
            data_path: None,
            save_lock: Mutex::new(()),
        };

        for house in snapshot.houses {
            store.houses.insert(house.id.clone(), house);
        }
        for user in snapshot.users {
            store.users.insert(user.id.clone(), user);
        }
        for class in snapshot.device_classes {
            store.classes.insert(class.id.clone(), class);
        }
        for device in snapshot.devices {
            store.devices.insert(device.id.clone(), device);
        }
        for scenario in snapshot.scenarios {
            store.scenarios.insert(scenario.id.clone(), scenario);
        }
        for pair in snapshot.opposites {
            store.opposites.insert(pair.state, pair.opposite);
        }
        for reading in snapshot.readings {
            store.record_reading(reading);
        }
        for measurement in snapshot.measurements {
            store.put_measurement(measurement);
        }
        for stored in snapshot.room_states {
            match stored.scenario {
                Some(scenario) => {
                    store.scenario_states.insert((scenario, stored.room), stored.state);
                }
                None => {
                    store.room_states.insert(stored.room, stored.state);
                }
            }
        }
        for set in snapshot.instruction_sets {
            let mut entry = store.instructions.entry(set.room.clone()).or_default();
            entry.sets.retain(|s| s.owner != set.owner);
            entry.sets.push(set);
        }

        store
    }

    /// Capture the store contents
    #[must_use]
    pub fn snapshot(&self) -> FactSnapshot {
        let mut houses: Vec<House> = self.houses.iter().map(|r| r.value().clone()).collect();
        houses.sort_by(|a, b| a.id.cmp(&b.id));
        let mut users: Vec<User> = self.users.iter().map(|r| r.value().clone()).collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));

        let mut opposites: Vec<OppositePair> = self
            .opposites
            .iter()
            .map(|r| OppositePair {
                state: *r.key(),
                opposite: *r.value(),
            })
            .collect();
        opposites.sort_by_key(|p| p.state);

        let readings: Vec<SensorReading> = self
            .readings
            .iter()
            .flat_map(|r| r.value().clone())
            .collect();

        let mut room_states: Vec<StoredRoomState> = self
            .room_states
            .iter()
            .map(|r| StoredRoomState {
                room: r.key().clone(),
                scenario: None,
                state: r.value().clone(),
            })
            .collect();
        room_states.extend(self.scenario_states.iter().map(|r| StoredRoomState {
            room: r.key().1.clone(),
            scenario: Some(r.key().0.clone()),
            state: r.value().clone(),
        }));

        FactSnapshot {
            houses,
            users,
            device_classes: self.device_classes(),
            devices: self.devices(),
            scenarios: self.scenarios(),
            opposites,
            readings,
            measurements: self.measurements.iter().map(|r| r.value().clone()).collect(),
            room_states,
            instruction_sets: self
                .instructions
                .iter()
                .flat_map(|r| r.value().sets.clone())
                .collect(),
        }
    }

    /// Persist the snapshot to the backing file, if any
    #[allow(clippy::missing_errors_doc)]
    pub async fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.data_path else {
            return Ok(());
        };
        // Capture under the lock so the last writer also saves the newest facts
        let _guard = self.save_lock.lock().await;
        persistence::save_snapshot(path, &self.snapshot()).await?;
        Ok(())
    }

    pub fn insert_house(&self, house: House) {
        self.houses.insert(house.id.clone(), house);
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn insert_device_class(&self, class: DeviceClass) {
        self.classes.insert(class.id.clone(), class);
    }

    pub fn insert_device(&self, device: Device) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn insert_scenario(&self, scenario: Scenario) {
        self.scenarios.insert(scenario.id.clone(), scenario);
    }

    /// Drop the opposite relation of a state (and only that direction)
    pub fn remove_opposite(&self, state: StateClass) {
        self.opposites.remove(&state);
    }
}

impl FactStore for MemoryStore {
    fn houses(&self) -> Vec<House> {
        let mut houses: Vec<House> = self.houses.iter().map(|r| r.value().clone()).collect();
        houses.sort_by(|a, b| a.id.cmp(&b.id));
        houses
    }

    fn get_house(&self, house: &HouseId) -> Option<House> {
        self.houses.get(house).map(|r| r.value().clone())
    }

    fn house_of_room(&self, room: &RoomId) -> Option<House> {
        self.houses()
            .into_iter()
            .find(|house| house.rooms.contains(room))
    }

    fn get_range(&self, user: &UserId, parameter: Parameter) -> Option<Range> {
        self.users
            .get(user)
            .and_then(|u| u.preferences.get(parameter))
    }

    fn set_range(
        &self,
        user: &UserId,
        parameter: Parameter,
        range: Range,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(format!("user {user}")))?;
        if !entry.preferences.set(parameter, range) {
            return Err(StoreError::NotFound(format!(
                "{parameter} preference of user {user}"
            )));
        }
        Ok(())
    }

    fn get_history(&self, user: &UserId, device: &DeviceId) -> Vec<HistorySample> {
        self.users
            .get(user)
            .map(|u| {
                u.history
                    .iter()
                    .filter(|e| &e.device == device)
                    .map(|e| e.sample)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record_reading(&self, reading: SensorReading) {
        let mut entry = self
            .readings
            .entry((reading.room.clone(), reading.parameter))
            .or_default();
        match entry.iter_mut().find(|r| r.sensor == reading.sensor) {
            Some(existing) => *existing = reading,
            None => entry.push(reading),
        }
    }

    fn sensor_readings(&self, room: &RoomId, parameter: Parameter) -> Vec<f64> {
        self.readings
            .get(&(room.clone(), parameter))
            .map(|r| r.value().iter().map(|reading| reading.value).collect())
            .unwrap_or_default()
    }

    fn expire_readings(&self, room: &RoomId, before: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for parameter in Parameter::ALL {
            if let Some(mut entry) = self.readings.get_mut(&(room.clone(), parameter)) {
                let count = entry.len();
                entry.retain(|r| r.recorded_at >= before);
                expired += count - entry.len();
            }
        }
        expired
    }

    fn get_measurement(&self, room: &RoomId, parameter: Parameter) -> Option<f64> {
        self.measurements
            .get(&(room.clone(), parameter))
            .map(|m| m.value)
    }

    fn put_measurement(&self, measurement: Measurement) {
        self.measurements
            .insert((measurement.room.clone(), measurement.parameter), measurement);
    }

    fn remove_measurement(&self, room: &RoomId, parameter: Parameter) -> Option<Measurement> {
        self.measurements
            .remove(&(room.clone(), parameter))
            .map(|(_, m)| m)
    }

    fn get_room_state(&self, room: &RoomId) -> Option<RoomState> {
        self.room_states.get(room).map(|r| r.value().clone())
    }

    fn put_room_state(&self, room: &RoomId, state: RoomState) {
        self.room_states.insert(room.clone(), state);
    }

    fn get_scenario_state(&self, scenario: &ScenarioId, room: &RoomId) -> Option<RoomState> {
        self.scenario_states
            .get(&(scenario.clone(), room.clone()))
            .map(|r| r.value().clone())
    }

    fn put_scenario_state(&self, scenario: &ScenarioId, room: &RoomId, state: RoomState) {
        self.scenario_states
            .insert((scenario.clone(), room.clone()), state);
    }

    fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.iter().map(|r| r.value().clone()).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    fn get_devices_in_room(&self, room: &RoomId) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|r| &r.value().room == room)
            .map(|r| r.value().clone())
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    fn get_device_capabilities(&self, device: &DeviceId) -> Option<Capabilities> {
        let class = self.devices.get(device)?.class.clone();
        self.classes.get(&class).map(|c| c.capabilities.clone())
    }

    fn is_device_on(&self, device: &DeviceId) -> Option<bool> {
        self.devices.get(device).map(|d| d.state_on)
    }

    fn set_device_on(&self, device: &DeviceId, on: bool) -> Result<(), StoreError> {
        let mut entry = self
            .devices
            .get_mut(device)
            .ok_or_else(|| StoreError::NotFound(format!("device {device}")))?;
        entry.state_on = on;
        Ok(())
    }

    fn device_classes(&self) -> Vec<DeviceClass> {
        let mut classes: Vec<DeviceClass> =
            self.classes.iter().map(|r| r.value().clone()).collect();
        classes.sort_by(|a, b| a.id.cmp(&b.id));
        classes
    }

    fn set_class_capabilities(
        &self,
        class: &DeviceClassId,
        capabilities: Capabilities,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .classes
            .get_mut(class)
            .ok_or_else(|| StoreError::NotFound(format!("device class {class}")))?;
        entry.capabilities = capabilities;
        Ok(())
    }

    fn opposite_state(&self, state: StateClass) -> Option<StateClass> {
        self.opposites.get(&state).map(|r| *r.value())
    }

    fn scenarios(&self) -> Vec<Scenario> {
        let mut scenarios: Vec<Scenario> =
            self.scenarios.iter().map(|r| r.value().clone()).collect();
        scenarios.sort_by(|a, b| a.id.cmp(&b.id));
        scenarios
    }

    fn get_scenario(&self, scenario: &ScenarioId) -> Option<Scenario> {
        self.scenarios.get(scenario).map(|r| r.value().clone())
    }

    fn mark_scenario_recomputed(
        &self,
        scenario: &ScenarioId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .scenarios
            .get_mut(scenario)
            .ok_or_else(|| StoreError::NotFound(format!("scenario {scenario}")))?;
        entry.last_recomputed = Some(at);
        Ok(())
    }

    fn room_revision(&self, room: &RoomId) -> Revision {
        self.instructions.get(room).map(|r| r.revision).unwrap_or(0)
    }

    fn get_instruction_set(
        &self,
        room: &RoomId,
        owner: &InstructionOwner,
    ) -> Option<InstructionSet> {
        self.instructions
            .get(room)
            .and_then(|r| r.sets.iter().find(|s| &s.owner == owner).cloned())
    }

    fn instruction_sets(&self, room: &RoomId) -> Vec<InstructionSet> {
        self.instructions
            .get(room)
            .map(|r| r.sets.clone())
            .unwrap_or_default()
    }

    fn write_instruction_set(
        &self,
        set: InstructionSet,
        expected: Revision,
    ) -> Result<Revision, StoreError> {
        // The entry guard holds the shard lock for the whole replace
        let mut entry = self.instructions.entry(set.room.clone()).or_default();
        if entry.revision != expected {
            return Err(StoreError::Conflict {
                room: set.room,
                expected,
                found: entry.revision,
            });
        }
        entry.sets.retain(|s| s.owner != set.owner);
        entry.sets.push(set);
        entry.revision += 1;
        Ok(entry.revision)
    }

    fn delete_instruction_set(
        &self,
        room: &RoomId,
        owner: &InstructionOwner,
        expected: Revision,
    ) -> Result<Revision, StoreError> {
        let mut entry = self.instructions.entry(room.clone()).or_default();
        if entry.revision != expected {
            return Err(StoreError::Conflict {
                room: room.clone(),
                expected,
                found: entry.revision,
            });
        }
        let before = entry.sets.len();
        entry.sets.retain(|s| &s.owner != owner);
        if entry.sets.len() != before {
            entry.revision += 1;
        }
        Ok(entry.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::TargetState;
    use crate::state::Level;

    fn room() -> RoomId {
        RoomId::new("living")
    }

    #[test]
    fn test_write_replaces_same_owner_and_bumps_revision() {
        let store = MemoryStore::new();
        let mut first = InstructionSet::new(room(), InstructionOwner::Machine);
        first.set(DeviceId::new("ac"), TargetState::On);
        let rev = store.write_instruction_set(first, 0).unwrap();
        assert_eq!(rev, 1);

        let second = InstructionSet::new(room(), InstructionOwner::Machine);
        let second_id = second.id;
        let rev = store.write_instruction_set(second, rev).unwrap();
        assert_eq!(rev, 2);

        let sets = store.instruction_sets(&room());
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].id, second_id);
        assert!(sets[0].is_empty());
    }

    #[test]
    fn test_stale_revision_conflicts() {
        let store = MemoryStore::new();
        store
            .write_instruction_set(InstructionSet::new(room(), InstructionOwner::Final), 0)
            .unwrap();
        let err = store
            .write_instruction_set(InstructionSet::new(room(), InstructionOwner::Final), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_delete_missing_set_keeps_revision() {
        let store = MemoryStore::new();
        let rev = store
            .delete_instruction_set(&room(), &InstructionOwner::Machine, 0)
            .unwrap();
        assert_eq!(rev, 0);
    }

    #[test]
    fn test_sensor_reading_superseded_per_sensor() {
        let store = MemoryStore::new();
        for (sensor, value) in [("s1", 20.0), ("s2", 24.0), ("s1", 22.0)] {
            store.record_reading(SensorReading::new(
                sensor,
                "living",
                Parameter::Temperature,
                value,
            ));
        }
        assert_eq!(
            store.sensor_readings(&room(), Parameter::Temperature),
            vec![22.0, 24.0]
        );
    }

    #[test]
    fn test_stale_readings_expire() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut old = SensorReading::new("s1", "living", Parameter::Temperature, 30.0);
        old.recorded_at = now - chrono::Duration::minutes(30);
        store.record_reading(old);
        store.record_reading(SensorReading::new("s2", "living", Parameter::Temperature, 22.0));
        store.record_reading(SensorReading::new("h1", "kitchen", Parameter::Humidity, 50.0));

        let expired = store.expire_readings(&room(), now - chrono::Duration::minutes(15));
        assert_eq!(expired, 1);
        assert_eq!(
            store.sensor_readings(&room(), Parameter::Temperature),
            vec![22.0]
        );
        assert_eq!(
            store.sensor_readings(&RoomId::new("kitchen"), Parameter::Humidity),
            vec![50.0]
        );
    }

    #[test]
    fn test_remove_measurement() {
        let store = MemoryStore::new();
        store.put_measurement(Measurement::now(room(), Parameter::Co2, 600.0));
        assert!(store.remove_measurement(&room(), Parameter::Co2).is_some());
        assert_eq!(store.get_measurement(&room(), Parameter::Co2), None);
        assert!(store.remove_measurement(&room(), Parameter::Co2).is_none());
    }

    #[test]
    fn test_capabilities_come_from_class() {
        let store = MemoryStore::new();
        store.insert_device_class(DeviceClass {
            id: DeviceClassId::new("heater"),
            name: "Heater".to_string(),
            capabilities: Capabilities::new(
                Vec::new(),
                [StateClass::new(Parameter::Temperature, Level::Low)],
            ),
            weather_dependent: false,
        });
        store.insert_device(Device::new("h1", "living", "heater"));

        let caps = store.get_device_capabilities(&DeviceId::new("h1")).unwrap();
        assert!(caps
            .fixes
            .contains(&StateClass::new(Parameter::Temperature, Level::Low)));
        assert!(store
            .get_device_capabilities(&DeviceId::new("missing"))
            .is_none());
        assert_eq!(
            store.opposite_state(StateClass::new(Parameter::Temperature, Level::Low)),
            Some(StateClass::new(Parameter::Temperature, Level::High))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_keep_newest_facts() {
        let dir = std::env::temp_dir().join(format!("climate-{}", uuid::Uuid::new_v4()));
        let path = dir.join("facts.json");
        let store = std::sync::Arc::new(MemoryStore::open(path.clone()).await);

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store.insert_device(Device::new(format!("fan-{i}"), "living", "fan"));
                    store.save().await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let reopened = MemoryStore::open(path).await;
        assert_eq!(reopened.devices().len(), 16);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        let _ = std::fs::remove_dir_all(dir);
    }
}
