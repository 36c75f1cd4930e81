//! Error types for the decision engine

use climate_core::{DeviceId, RoomId, StateClass, StoreError, UserId};
use thiserror::Error;

/// Errors that can occur in the decision engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required measurement, range, state or entity is absent
    #[error("Missing fact: {0}")]
    MissingFact(String),

    /// Preference adaptation requested without any observed samples
    #[error("No history for user {user} and device {device}")]
    EmptyHistory { user: UserId, device: DeviceId },

    /// The capability model has no opposite for a state
    #[error("No opposite state known for {0}")]
    AmbiguousOpposite(StateClass),

    /// A room's instruction sets kept changing under the writer
    #[error("Concurrent write conflict on room {0}")]
    StoreWriteConflict(RoomId),

    /// Invalid time format
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Fact store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Failures that only abort the current room, scenario or device
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::MissingFact(_) | Self::EmptyHistory { .. } | Self::AmbiguousOpposite(_)
        )
    }
}
