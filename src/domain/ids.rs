//! Opaque identifiers
//!
//! Parsing and validation of the textual formats belong to the identifier
//! subsystem; inside the engine an id is only compared, ordered and printed.

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Globally unique, operator-scoped EVSE identifier
    EvseId
);
opaque_id!(StationId);
opaque_id!(PoolId);
opaque_id!(OperatorId);
opaque_id!(
    /// e-Mobility provider on whose behalf a command is issued
    ProviderId
);
opaque_id!(
    /// Authorizing identity: RFID token, contract account, PIN or remote id
    AuthIdentity
);
opaque_id!(ReservationId);
opaque_id!(SessionId);
opaque_id!(
    /// Charging product chosen for a session or reservation
    ProductId
);

impl ReservationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
