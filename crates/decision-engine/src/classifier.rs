//! State classification of measured values

use climate_core::{ClassifiedState, Level, Parameter, Range, StateClass};

/// CO2 concentration above which air counts as stale
pub const CO2_LIMIT_PPM: f64 = 800.0;

/// Span used to normalize CO2 excess when judging a scenario
pub const CO2_SCENARIO_SPAN_PPM: f64 = 700.0;

/// Half-width of the temperature band around a scenario target
pub const SCENARIO_TEMPERATURE_TOLERANCE: f64 = 0.5;

/// Half-width of the humidity band around a scenario target
pub const SCENARIO_HUMIDITY_TOLERANCE: f64 = 1.0;

/// Classify a value against `[low, high]`
#[must_use]
pub fn classify(low: f64, high: f64, value: f64) -> Level {
    if value < low {
        Level::Low
    } else if value > high {
        Level::High
    } else {
        Level::Normal
    }
}

/// Normalized deviation of a value from the boundary it violated
#[must_use]
pub fn deviation(boundary: f64, value: f64) -> f64 {
    (value - boundary) / boundary
}

/// Classify a value against a preferred range
#[must_use]
pub fn classify_in_range(parameter: Parameter, range: Range, value: f64) -> ClassifiedState {
    let level = classify(range.min, range.max, value);
    let deviation = match level {
        Level::Low => Some(deviation(range.min, value)),
        Level::High => Some(deviation(range.max, value)),
        Level::Normal => None,
    };
    ClassifiedState {
        state: StateClass::new(parameter, level),
        deviation: deviation.filter(|d| d.is_finite()),
    }
}

/// Classify CO2 against the fixed limit
#[must_use]
pub fn classify_co2(value: f64) -> ClassifiedState {
    classify_in_range(
        Parameter::Co2,
        Range::new(f64::NEG_INFINITY, CO2_LIMIT_PPM),
        value,
    )
}

/// Classify a value against a band around a scenario target
///
/// The deviation is the relative distance to the target itself, not to
/// the band edge.
#[must_use]
pub fn classify_against_target(
    parameter: Parameter,
    target: f64,
    tolerance: f64,
    value: f64,
) -> ClassifiedState {
    let level = classify(target - tolerance, target + tolerance, value);
    let deviation = match level {
        Level::Normal => None,
        _ => Some((value - target).abs() / target).filter(|d| d.is_finite()),
    };
    ClassifiedState {
        state: StateClass::new(parameter, level),
        deviation,
    }
}

/// Classify CO2 for a scenario, normalizing the excess over the limit
#[must_use]
pub fn classify_co2_for_scenario(value: f64) -> ClassifiedState {
    let mut classified = classify_co2(value);
    if !classified.state.is_normal() {
        classified.deviation = Some((value - CO2_LIMIT_PPM) / CO2_SCENARIO_SPAN_PPM);
    }
    classified
}
