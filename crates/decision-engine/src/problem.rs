//! Problem formulation from classified states

use crate::error::EngineError;
use climate_core::{ClassifiedState, StateClass};
use serde::Serialize;

/// An abnormal state that needs remediation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Problem {
    pub state: StateClass,
    /// Normalized deviation, `None` when unknown
    pub coefficient: Option<f64>,
}

impl Problem {
    /// Ranking weight; unknown deviations weigh nothing
    #[must_use]
    pub fn priority(&self) -> f64 {
        self.coefficient.map_or(0.0, f64::abs)
    }
}

/// Problems ranked by priority, plus the states that are already normal
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Formulation {
    pub problems: Vec<Problem>,
    pub normals: Vec<StateClass>,
}

impl Formulation {
    /// True when no device changes are needed
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.problems.is_empty()
    }

    #[must_use]
    pub fn is_normal(&self, state: &StateClass) -> bool {
        self.normals.contains(state)
    }

    #[must_use]
    pub fn is_open(&self, state: &StateClass) -> bool {
        self.problems.iter().any(|p| &p.state == state)
    }
}

/// Split classified states into ranked problems and normals
///
/// Problems are sorted by descending `|coefficient|`; ties keep input
/// order. Unknown deviations sort last.
pub fn formulate(states: &[ClassifiedState]) -> Result<Formulation, EngineError> {
    let mut formulation = Formulation::default();

    for classified in states {
        if classified.state.is_normal() {
            formulation.normals.push(classified.state);
        } else {
            formulation.problems.push(Problem {
                state: classified.state,
                coefficient: classified.deviation,
            });
        }
    }

    if formulation.problems.is_empty() && formulation.normals.is_empty() {
        return Err(EngineError::MissingFact("classified room state".to_string()));
    }

    sort_problems(&mut formulation.problems);
    Ok(formulation)
}

/// Stable sort by descending priority
pub fn sort_problems(problems: &mut [Problem]) {
    problems.sort_by(|a, b| b.priority().total_cmp(&a.priority()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use climate_core::{Level, Parameter};

    fn state(parameter: Parameter, level: Level, deviation: Option<f64>) -> ClassifiedState {
        ClassifiedState {
            state: StateClass::new(parameter, level),
            deviation,
        }
    }

    #[test]
    fn test_problems_sorted_by_magnitude() {
        let states = [
            state(Parameter::Temperature, Level::High, Some(0.1)),
            state(Parameter::Humidity, Level::Low, Some(-0.4)),
            state(Parameter::Co2, Level::High, Some(0.25)),
        ];
        let formulation = formulate(&states).unwrap();
        let order: Vec<_> = formulation.problems.iter().map(|p| p.state.parameter).collect();
        assert_eq!(
            order,
            vec![Parameter::Humidity, Parameter::Co2, Parameter::Temperature]
        );
        assert!(formulation.normals.is_empty());
    }

    #[test]
    fn test_ties_keep_input_order() {
        let states = [
            state(Parameter::Co2, Level::High, Some(0.2)),
            state(Parameter::Temperature, Level::Low, Some(-0.2)),
            state(Parameter::Humidity, Level::High, Some(0.2)),
        ];
        let formulation = formulate(&states).unwrap();
        let order: Vec<_> = formulation.problems.iter().map(|p| p.state.parameter).collect();
        assert_eq!(
            order,
            vec![Parameter::Co2, Parameter::Temperature, Parameter::Humidity]
        );
    }

    #[test]
    fn test_unknown_deviation_sorts_last() {
        let states = [
            state(Parameter::Humidity, Level::High, None),
            state(Parameter::Temperature, Level::High, Some(0.01)),
        ];
        let formulation = formulate(&states).unwrap();
        assert_eq!(formulation.problems[0].state.parameter, Parameter::Temperature);
        assert_eq!(formulation.problems[1].priority(), 0.0);
    }

    #[test]
    fn test_normals_never_become_problems() {
        let states = [
            ClassifiedState::normal(Parameter::Temperature),
            ClassifiedState::normal(Parameter::Humidity),
        ];
        let formulation = formulate(&states).unwrap();
        assert!(formulation.is_settled());
        assert_eq!(formulation.normals.len(), 2);
    }

    #[test]
    fn test_open_and_normal_lookup() {
        let hot = StateClass::new(Parameter::Temperature, Level::High);
        let states = [
            state(Parameter::Temperature, Level::High, Some(0.25)),
            ClassifiedState::normal(Parameter::Humidity),
        ];
        let formulation = formulate(&states).unwrap();
        assert!(formulation.is_open(&hot));
        assert!(!formulation.is_open(&StateClass::new(Parameter::Temperature, Level::Low)));
        assert!(formulation.is_normal(&StateClass::normal(Parameter::Humidity)));
        assert!(!formulation.is_normal(&hot));
    }

    #[test]
    fn test_empty_input_is_missing_fact() {
        let err = formulate(&[]).unwrap_err();
        assert!(matches!(err, EngineError::MissingFact(_)));
        assert!(err.is_soft());
    }
}
