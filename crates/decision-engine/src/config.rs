//! Engine configuration read from the environment

use crate::error::EngineError;
use crate::freshness::FreshnessPolicy;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration of the decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the facts snapshot
    pub data_dir: PathBuf,
    /// Which scenarios count as actual
    pub freshness: FreshnessPolicy,
    /// Seconds between detection cycles of every house (0 disables them)
    pub detection_interval_secs: u64,
    /// Readings older than this are ignored when measuring (0 keeps them forever)
    pub reading_max_age_secs: u64,
    /// Cron expression for scenario re-evaluation ticks
    pub scenario_cron: String,
    /// Address the API server binds to
    pub listen_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            freshness: FreshnessPolicy::default(),
            detection_interval_secs: 60,
            reading_max_age_secs: 900,
            scenario_cron: "0 */5 * * * *".to_string(),
            listen_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl EngineConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(policy) = lookup("FRESHNESS_POLICY") {
            config.freshness = policy.parse()?;
        }
        if let Some(secs) = lookup("DETECTION_INTERVAL_SECS") {
            config.detection_interval_secs = secs.trim().parse().map_err(|_| {
                EngineError::InvalidConfig(format!("DETECTION_INTERVAL_SECS={secs}"))
            })?;
        }
        if let Some(secs) = lookup("READING_MAX_AGE_SECS") {
            config.reading_max_age_secs = secs.trim().parse().map_err(|_| {
                EngineError::InvalidConfig(format!("READING_MAX_AGE_SECS={secs}"))
            })?;
        }
        if let Some(expression) = lookup("SCENARIO_CRON") {
            config.scenario_cron = expression;
        }
        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        Ok(config)
    }

    /// How long a reading counts, `None` when readings never expire
    #[must_use]
    pub fn reading_max_age(&self) -> Option<Duration> {
        if self.reading_max_age_secs == 0 {
            return None;
        }
        i64::try_from(self.reading_max_age_secs)
            .ok()
            .and_then(Duration::try_seconds)
    }

    /// Path of the facts snapshot file
    #[must_use]
    pub fn facts_path(&self) -> PathBuf {
        self.data_dir.join("facts.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_without_env() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.freshness, FreshnessPolicy::ClockWindow);
        assert_eq!(config.detection_interval_secs, 60);
        assert_eq!(config.reading_max_age(), Some(Duration::minutes(15)));
        assert_eq!(config.facts_path(), PathBuf::from("./data/facts.json"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATA_DIR", "/var/lib/climate"),
            ("FRESHNESS_POLICY", "recomputed:15"),
            ("DETECTION_INTERVAL_SECS", "30"),
            ("READING_MAX_AGE_SECS", "0"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.freshness, FreshnessPolicy::RecomputedWithin { minutes: 15 });
        assert_eq!(config.detection_interval_secs, 30);
        assert_eq!(config.reading_max_age(), None);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/climate"));
    }

    #[test]
    fn test_bad_interval_rejected() {
        let err = EngineConfig::from_lookup(|k| {
            (k == "DETECTION_INTERVAL_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
