//! Measurement creation and state detection
//!
//! Sensor readings are averaged into one measurement per parameter, and
//! measurements are classified against the owner's preferences (room
//! state) or against a scenario's targets (scenario state).

use crate::classifier::{
    classify_against_target, classify_co2, classify_co2_for_scenario, classify_in_range,
    SCENARIO_HUMIDITY_TOLERANCE, SCENARIO_TEMPERATURE_TOLERANCE,
};
use crate::error::EngineError;
use climate_core::measurement::mean;
use climate_core::{
    ClassifiedState, FactStore, House, Measurement, Parameter, RoomId, RoomState, Scenario,
};

/// Average a room's current readings of one parameter into a measurement
pub fn create_measurement(
    store: &dyn FactStore,
    room: &RoomId,
    parameter: Parameter,
) -> Result<Measurement, EngineError> {
    let readings = store.sensor_readings(room, parameter);
    let Some(value) = mean(&readings) else {
        // Never let an earlier cycle's value stand in for a missing one
        if store.remove_measurement(room, parameter).is_some() {
            tracing::debug!("Dropped stale {} measurement in {}", parameter, room);
        }
        return Err(EngineError::MissingFact(format!(
            "{parameter} readings in room {room}"
        )));
    };

    let measurement = Measurement::now(room.clone(), parameter, value);
    store.put_measurement(measurement.clone());
    tracing::debug!(
        "Measured {} = {:.2} in {} from {} readings",
        parameter,
        value,
        room,
        readings.len()
    );
    Ok(measurement)
}

/// Create measurements for every parameter that has readings.
///
/// Parameters without readings lose their previous measurement, so the
/// room cannot be classified until sensors report again.
pub fn create_measurements(store: &dyn FactStore, room: &RoomId) -> Vec<Measurement> {
    Parameter::ALL
        .into_iter()
        .filter_map(|parameter| match create_measurement(store, room, parameter) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::debug!("No new measurement: {}", e);
                None
            }
        })
        .collect()
}

fn measured(store: &dyn FactStore, room: &RoomId, parameter: Parameter) -> Result<f64, EngineError> {
    store
        .get_measurement(room, parameter)
        .ok_or_else(|| EngineError::MissingFact(format!("{parameter} measurement in room {room}")))
}

/// Classify a room against its house owner's preferences
pub fn detect_room_state(
    store: &dyn FactStore,
    house: &House,
    room: &RoomId,
) -> Result<RoomState, EngineError> {
    let mut states: Vec<ClassifiedState> = Vec::with_capacity(Parameter::ALL.len());

    for parameter in [Parameter::Temperature, Parameter::Humidity] {
        let range = store.get_range(&house.owner, parameter).ok_or_else(|| {
            EngineError::MissingFact(format!("{parameter} preference of {}", house.owner))
        })?;
        let value = measured(store, room, parameter)?;
        states.push(classify_in_range(parameter, range, value));
    }
    states.push(classify_co2(measured(store, room, Parameter::Co2)?));

    let state = RoomState::new(states);
    store.put_room_state(room, state.clone());
    tracing::debug!("Room {} state: {}", room, describe(&state));
    Ok(state)
}

/// Classify a room against a scenario's targets
pub fn detect_scenario_state(
    store: &dyn FactStore,
    scenario: &Scenario,
    room: &RoomId,
) -> Result<RoomState, EngineError> {
    let target = scenario.target_for(room).ok_or_else(|| {
        EngineError::MissingFact(format!("target of scenario {} for room {room}", scenario.id))
    })?;

    let states = vec![
        classify_against_target(
            Parameter::Temperature,
            target.temperature,
            SCENARIO_TEMPERATURE_TOLERANCE,
            measured(store, room, Parameter::Temperature)?,
        ),
        classify_against_target(
            Parameter::Humidity,
            target.humidity,
            SCENARIO_HUMIDITY_TOLERANCE,
            measured(store, room, Parameter::Humidity)?,
        ),
        classify_co2_for_scenario(measured(store, room, Parameter::Co2)?),
    ];

    let state = RoomState::new(states);
    store.put_scenario_state(&scenario.id, room, state.clone());
    tracing::debug!(
        "Scenario {} state in {}: {}",
        scenario.id,
        room,
        describe(&state)
    );
    Ok(state)
}

fn describe(state: &RoomState) -> String {
    state
        .states
        .iter()
        .map(|s| s.state.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
