//! Typed identifiers for facts held in the store

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! fact_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from anything string-like
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

fact_id!(
    /// A house, the unit owning rooms and a preference holder
    HouseId
);
fact_id!(
    /// A room with its own sensors, devices and instruction sets
    RoomId
);
fact_id!(
    /// A controllable device
    DeviceId
);
fact_id!(
    /// A device class carrying the capability edges
    DeviceClassId
);
fact_id!(
    /// A user owning comfort preferences and a device history
    UserId
);
fact_id!(
    /// A scheduled scenario
    ScenarioId
);
fact_id!(
    /// A physical sensor reporting readings
    SensorId
);
