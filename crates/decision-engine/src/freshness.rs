//! Scenario actuality
//!
//! Exactly one policy decides which scenarios take part in arbitration:
//! either the scenario's clock window contains the current time, or its
//! instructions were recomputed recently enough.

use crate::error::EngineError;
use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use climate_core::Scenario;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Minutes a recomputation stays fresh unless configured otherwise
pub const DEFAULT_RECOMPUTE_MINUTES: i64 = 10;

/// Policy deciding whether a scenario is actual
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FreshnessPolicy {
    /// Current local time falls in `[start, finish)`, wrapping past midnight
    #[default]
    ClockWindow,
    /// Last recomputation happened at most this many minutes ago
    RecomputedWithin { minutes: i64 },
}

impl FreshnessPolicy {
    /// Check a scenario against the current time
    pub fn is_actual(&self, scenario: &Scenario) -> Result<bool, EngineError> {
        self.is_actual_at(scenario, Local::now())
    }

    /// Check a scenario against a given instant
    pub fn is_actual_at(
        &self,
        scenario: &Scenario,
        now: DateTime<Local>,
    ) -> Result<bool, EngineError> {
        match self {
            Self::ClockWindow => {
                let start = parse_time(&scenario.start)?;
                let finish = parse_time(&scenario.finish)?;
                Ok(in_window(start, finish, now.time()))
            }
            Self::RecomputedWithin { minutes } => {
                let Some(last) = scenario.last_recomputed else {
                    return Ok(false);
                };
                let age = now.with_timezone(&Utc) - last;
                Ok(age >= Duration::zero() && age <= Duration::minutes(*minutes))
            }
        }
    }

    /// Whether evaluating a scenario is skipped while it is not actual.
    ///
    /// Under `RecomputedWithin` evaluation is what refreshes the
    /// timestamp, so it always runs.
    #[must_use]
    pub fn gates_evaluation(&self) -> bool {
        matches!(self, Self::ClockWindow)
    }
}

impl FromStr for FreshnessPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "window" | "clock_window" => Ok(Self::ClockWindow),
            "recomputed" => Ok(Self::RecomputedWithin {
                minutes: DEFAULT_RECOMPUTE_MINUTES,
            }),
            _ => {
                let minutes = s
                    .strip_prefix("recomputed:")
                    .and_then(|m| m.parse::<i64>().ok())
                    .filter(|m| *m > 0)
                    .ok_or_else(|| EngineError::InvalidConfig(format!("FRESHNESS_POLICY={s}")))?;
                Ok(Self::RecomputedWithin { minutes })
            }
        }
    }
}

/// Half-open window check with wrap-around (e.g. 22:00 to 06:00)
fn in_window(start: NaiveTime, finish: NaiveTime, now: NaiveTime) -> bool {
    if start <= finish {
        now >= start && now < finish
    } else {
        now >= start || now < finish
    }
}

/// Parse a time string in HH:MM format
pub(crate) fn parse_time(s: &str) -> Result<NaiveTime, EngineError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| EngineError::InvalidTimeFormat(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use climate_core::ScenarioId;

    fn scenario(start: &str, finish: &str) -> Scenario {
        Scenario {
            id: ScenarioId::new("night"),
            name: "Night".to_string(),
            priority: 1,
            start: start.to_string(),
            finish: finish.to_string(),
            last_recomputed: None,
            targets: Vec::new(),
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, 12, hour, minute, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let policy = FreshnessPolicy::ClockWindow;
        let s = scenario("08:00", "17:00");
        assert!(policy.is_actual_at(&s, at(8, 0)).unwrap());
        assert!(policy.is_actual_at(&s, at(16, 59)).unwrap());
        assert!(!policy.is_actual_at(&s, at(17, 0)).unwrap());
        assert!(!policy.is_actual_at(&s, at(7, 59)).unwrap());
    }

    #[test]
    fn test_window_wraps_past_midnight() {
        let policy = FreshnessPolicy::ClockWindow;
        let s = scenario("22:00", "06:00");
        assert!(policy.is_actual_at(&s, at(23, 30)).unwrap());
        assert!(policy.is_actual_at(&s, at(5, 59)).unwrap());
        assert!(!policy.is_actual_at(&s, at(6, 0)).unwrap());
        assert!(!policy.is_actual_at(&s, at(12, 0)).unwrap());
    }

    #[test]
    fn test_bad_time_is_error() {
        let policy = FreshnessPolicy::ClockWindow;
        let err = policy.is_actual_at(&scenario("8am", "17:00"), at(9, 0));
        assert!(matches!(err, Err(EngineError::InvalidTimeFormat(_))));
    }

    #[test]
    fn test_recomputed_within() {
        let policy = FreshnessPolicy::RecomputedWithin { minutes: 10 };
        let now = at(12, 0);
        let mut s = scenario("00:00", "00:01");
        assert!(!policy.is_actual_at(&s, now).unwrap());

        s.last_recomputed = Some((now - Duration::minutes(9)).with_timezone(&Utc));
        assert!(policy.is_actual_at(&s, now).unwrap());

        s.last_recomputed = Some((now - Duration::minutes(11)).with_timezone(&Utc));
        assert!(!policy.is_actual_at(&s, now).unwrap());
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("window".parse::<FreshnessPolicy>().unwrap(), FreshnessPolicy::ClockWindow);
        assert_eq!(
            "recomputed".parse::<FreshnessPolicy>().unwrap(),
            FreshnessPolicy::RecomputedWithin { minutes: 10 }
        );
        assert!("recomputed:-3".parse::<FreshnessPolicy>().is_err());
        assert!("sometimes".parse::<FreshnessPolicy>().is_err());
    }
}
