//! Weather consequences for weather-dependent devices
//!
//! An opened window heats the room on a hot day and cools it on a cold
//! one. Classes marked weather dependent get their temperature edges
//! rewritten from the outdoor temperature: they cause the outdoor state
//! and fix its opposite.

use crate::classifier::classify;
use crate::error::EngineError;
use climate_core::{Capabilities, DeviceClassId, FactStore, House, Level, Parameter, StateClass};
use serde::Serialize;

/// Result of one weather update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherUpdate {
    pub outdoor: Level,
    pub updated: Vec<DeviceClassId>,
    pub skipped: Vec<SkippedClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedClass {
    pub class: DeviceClassId,
    pub reason: String,
}

/// Temperature edges a weather-dependent class gets for an outdoor level
fn consequences(
    store: &dyn FactStore,
    current: &Capabilities,
    outdoor: Level,
) -> Result<Capabilities, EngineError> {
    let mut capabilities = current.clone();
    capabilities.clear_parameter(Parameter::Temperature);
    if outdoor == Level::Normal {
        return Ok(capabilities);
    }

    let caused = StateClass::new(Parameter::Temperature, outdoor);
    let fixed = store
        .opposite_state(caused)
        .ok_or(EngineError::AmbiguousOpposite(caused))?;
    capabilities.causes.insert(caused);
    capabilities.fixes.insert(fixed);
    Ok(capabilities)
}

/// Rewrite the temperature edges of every weather-dependent class
pub fn apply_weather(
    store: &dyn FactStore,
    house: &House,
    outdoor_temperature: f64,
) -> Result<WeatherUpdate, EngineError> {
    let range = store
        .get_range(&house.owner, Parameter::Temperature)
        .ok_or_else(|| {
            EngineError::MissingFact(format!("temperature preference of {}", house.owner))
        })?;
    let outdoor = classify(range.min, range.max, outdoor_temperature);
    tracing::info!(
        "Outdoor temperature {:.1} at {} is {}",
        outdoor_temperature,
        house.id,
        outdoor.as_str()
    );

    let mut update = WeatherUpdate {
        outdoor,
        updated: Vec::new(),
        skipped: Vec::new(),
    };

    for class in store.device_classes().into_iter().filter(|c| c.weather_dependent) {
        match consequences(store, &class.capabilities, outdoor) {
            Ok(capabilities) => {
                store.set_class_capabilities(&class.id, capabilities)?;
                update.updated.push(class.id);
            }
            Err(e) if e.is_soft() => {
                tracing::warn!("Weather update skipped for {}: {}", class.id, e);
                update.skipped.push(SkippedClass {
                    class: class.id,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(update)
}
