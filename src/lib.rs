//! # EVSE Engine
//!
//! State and command engine for a single Electric Vehicle Supply Equipment
//! (EVSE) inside a charging hierarchy.
//!
//! ## Architecture
//!
//! - **domain**: Identifiers, statuses, reservations, sessions, command
//!   requests/results and notification events
//! - **application**: The EVSE aggregate, reservation store, session
//!   lifecycle, fallback dispatcher, charging hierarchy and event bus
//! - **shared**: Clock, cancellation and periodic task helpers
//! - **config** / **runtime**: TOML configuration and tracing setup
//!
//! An [`Evse`] answers Reserve, CancelReservation, RemoteStart, RemoteStop,
//! AuthorizeStart and AuthorizeStop. A virtual EVSE executes them itself; any
//! EVSE can delegate them to its own controller or to the station, pool,
//! operator and roaming provider above it.

pub mod application;
pub mod config;
pub mod domain;
pub mod runtime;
pub mod shared;

pub use config::{default_config_path, AppConfig, ConfigError};

pub use application::{
    create_event_bus, ChargingPool, ChargingStation, ChargingStationOperator, EventBus,
    EventSink, EventSubscriber, Evse, EvseBuilder, EvseKind, EvseSettings, EvseStatusCache,
    RemoteController, SharedController, SharedEventBus,
};
pub use domain::{Event, EventMessage};
