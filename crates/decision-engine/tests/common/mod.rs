//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use climate_core::{
    Capabilities, Device, DeviceClass, House, Level, MemoryStore, Parameter, Preferences, Range,
    RoomId, Scenario, ScenarioTarget, SensorReading, StateClass, User,
};

pub const TEMP_HIGH: StateClass = StateClass::new(Parameter::Temperature, Level::High);
pub const TEMP_LOW: StateClass = StateClass::new(Parameter::Temperature, Level::Low);
pub const HUM_HIGH: StateClass = StateClass::new(Parameter::Humidity, Level::High);
pub const HUM_LOW: StateClass = StateClass::new(Parameter::Humidity, Level::Low);
pub const CO2_HIGH: StateClass = StateClass::new(Parameter::Co2, Level::High);

/// A house "home" owned by "alice" with the given rooms
pub fn seed_house(store: &MemoryStore, rooms: &[&str]) {
    store.insert_user(User {
        id: "alice".into(),
        name: Some("Alice".to_string()),
        preferences: Preferences {
            temperature: Some(Range::new(20.0, 24.0)),
            humidity: Some(Range::new(40.0, 60.0)),
        },
        history: Vec::new(),
    });
    store.insert_house(House {
        id: "home".into(),
        name: None,
        owner: "alice".into(),
        rooms: rooms.iter().map(|r| RoomId::new(*r)).collect(),
        location: None,
    });
}

pub fn seed_class(store: &MemoryStore, id: &str, causes: Vec<StateClass>, fixes: Vec<StateClass>) {
    store.insert_device_class(DeviceClass {
        id: id.into(),
        name: id.replace('_', " "),
        capabilities: Capabilities::new(causes, fixes),
        weather_dependent: false,
    });
}

pub fn seed_device(store: &MemoryStore, id: &str, room: &str, class: &str, on: bool) {
    let mut device = Device::new(id, room, class);
    device.state_on = on;
    store.insert_device(device);
}

/// Report temperature, humidity and CO2 for a room from one sensor each
pub fn report(store: &MemoryStore, room: &str, temperature: f64, humidity: f64, co2: f64) {
    use climate_core::FactStore;

    for (parameter, value) in [
        (Parameter::Temperature, temperature),
        (Parameter::Humidity, humidity),
        (Parameter::Co2, co2),
    ] {
        store.record_reading(SensorReading::new(
            format!("{room}-{parameter}"),
            room,
            parameter,
            value,
        ));
    }
}

pub fn scenario(id: &str, priority: i32, room: &str, temperature: f64, humidity: f64) -> Scenario {
    Scenario {
        id: id.into(),
        name: id.to_string(),
        priority,
        start: "00:00".to_string(),
        finish: "23:59".to_string(),
        last_recomputed: None,
        targets: vec![ScenarioTarget {
            room: room.into(),
            temperature,
            humidity,
        }],
    }
}
