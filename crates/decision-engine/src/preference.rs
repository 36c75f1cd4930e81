//! Preference adaptation from device-use history
//!
//! When a user keeps running a device, the conditions observed meanwhile
//! say where the user actually feels comfortable. The violated boundary of
//! the preferred range moves to the mean of those observations and the
//! range keeps its width.

use crate::error::EngineError;
use climate_core::measurement::mean;
use climate_core::{DeviceId, FactStore, Level, Parameter, Range, UserId};
use serde::Serialize;

/// Move the violated boundary to the mean of `values`, keeping `width`.
///
/// Returns `None` for an empty history.
#[must_use]
pub fn adapt_range(values: &[f64], width: f64, violated: Level) -> Option<Range> {
    let center = mean(values)?;
    Some(match violated {
        Level::Low => Range::new(center, center + width),
        _ => Range::new(center - width, center),
    })
}

/// Outcome of adapting one parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParameterOutcome {
    Adapted {
        parameter: Parameter,
        previous: Range,
        updated: Range,
    },
    Skipped {
        parameter: Parameter,
        reason: String,
    },
}

/// Adapt a user's ranges for every parameter the device fixes.
///
/// Temperature and humidity are handled independently; a soft failure on
/// one is reported as skipped and does not stop the other.
pub fn adapt_preferences(
    store: &dyn FactStore,
    user: &UserId,
    device: &DeviceId,
) -> Result<Vec<ParameterOutcome>, EngineError> {
    let capabilities = store
        .get_device_capabilities(device)
        .ok_or_else(|| EngineError::MissingFact(format!("capabilities of device {device}")))?;
    let history = store.get_history(user, device);

    let mut outcomes = Vec::new();
    for parameter in [Parameter::Temperature, Parameter::Humidity] {
        let Some(fixed) = capabilities.fixed_state_for(parameter) else {
            continue;
        };
        let values: Vec<f64> = history.iter().filter_map(|s| s.value(parameter)).collect();

        let outcome = adapt_parameter(store, user, device, parameter, fixed.level, &values);
        match outcome {
            Ok((previous, updated)) => {
                tracing::info!(
                    "Adapted {} range of {}: [{:.2}, {:.2}] -> [{:.2}, {:.2}]",
                    parameter,
                    user,
                    previous.min,
                    previous.max,
                    updated.min,
                    updated.max
                );
                outcomes.push(ParameterOutcome::Adapted {
                    parameter,
                    previous,
                    updated,
                });
            }
            Err(e) if e.is_soft() => {
                tracing::warn!("Skipping {} adaptation for {}: {}", parameter, user, e);
                outcomes.push(ParameterOutcome::Skipped {
                    parameter,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcomes)
}

fn adapt_parameter(
    store: &dyn FactStore,
    user: &UserId,
    device: &DeviceId,
    parameter: Parameter,
    violated: Level,
    values: &[f64],
) -> Result<(Range, Range), EngineError> {
    let previous = store
        .get_range(user, parameter)
        .ok_or_else(|| EngineError::MissingFact(format!("{parameter} range of user {user}")))?;
    let updated =
        adapt_range(values, previous.width(), violated).ok_or_else(|| EngineError::EmptyHistory {
            user: user.clone(),
            device: device.clone(),
        })?;
    store.set_range(user, parameter, updated)?;
    Ok((previous, updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use climate_core::{
        Capabilities, DeviceClass, Device, HistoryEntry, HistorySample, MemoryStore, Preferences,
        StateClass, User,
    };

    #[test]
    fn test_low_violation_moves_min() {
        let range = adapt_range(&[18.0, 19.0, 20.0], 4.0, Level::Low).unwrap();
        assert_eq!(range, Range::new(19.0, 23.0));
    }

    #[test]
    fn test_high_violation_moves_max() {
        let range = adapt_range(&[25.0, 27.0], 4.0, Level::High).unwrap();
        assert_eq!(range, Range::new(22.0, 26.0));
    }

    #[test]
    fn test_empty_history_is_none() {
        assert!(adapt_range(&[], 4.0, Level::Low).is_none());
    }

    #[test]
    fn test_idempotent_when_mean_equals_boundary() {
        let current = Range::new(20.0, 24.0);
        let once = adapt_range(&[23.0, 25.0], current.width(), Level::High).unwrap();
        assert!((once.max - current.max).abs() < 1e-9);
        let twice = adapt_range(&[23.0, 25.0], once.width(), Level::High).unwrap();
        assert!((twice.min - once.min).abs() < 1e-9);
        assert!((twice.max - once.max).abs() < 1e-9);
    }

    fn seeded_store(history: Vec<HistoryEntry>) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_device_class(DeviceClass {
            id: "heater_humidifier".into(),
            name: "Heater with humidifier".to_string(),
            capabilities: Capabilities::new(
                Vec::new(),
                [
                    StateClass::new(Parameter::Temperature, Level::Low),
                    StateClass::new(Parameter::Humidity, Level::Low),
                ],
            ),
            weather_dependent: false,
        });
        store.insert_device(Device::new("heater", "bedroom", "heater_humidifier"));
        store.insert_user(User {
            id: "alice".into(),
            name: None,
            preferences: Preferences {
                temperature: Some(Range::new(20.0, 24.0)),
                humidity: None,
            },
            history,
        });
        store
    }

    #[test]
    fn test_parameters_adapt_independently() {
        let store = seeded_store(vec![HistoryEntry {
            device: "heater".into(),
            sample: HistorySample {
                temperature: 21.0,
                humidity: 35.0,
            },
            recorded_at: None,
        }]);
        let user = UserId::new("alice");

        let outcomes = adapt_preferences(&store, &user, &DeviceId::new("heater")).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0],
            ParameterOutcome::Adapted {
                parameter: Parameter::Temperature,
                ..
            }
        ));
        // no humidity preference to adapt
        assert!(matches!(
            outcomes[1],
            ParameterOutcome::Skipped {
                parameter: Parameter::Humidity,
                ..
            }
        ));
        assert_eq!(
            store.get_range(&user, Parameter::Temperature),
            Some(Range::new(21.0, 25.0))
        );
    }

    #[test]
    fn test_empty_history_leaves_range() {
        let store = seeded_store(Vec::new());
        let user = UserId::new("alice");

        let outcomes = adapt_preferences(&store, &user, &DeviceId::new("heater")).unwrap();
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, ParameterOutcome::Skipped { .. })));
        assert_eq!(
            store.get_range(&user, Parameter::Temperature),
            Some(Range::new(20.0, 24.0))
        );
    }

    #[test]
    fn test_unknown_device_is_missing_fact() {
        let store = seeded_store(Vec::new());
        let err = adapt_preferences(&store, &UserId::new("alice"), &DeviceId::new("ghost"));
        assert!(matches!(err, Err(EngineError::MissingFact(_))));
    }
}
