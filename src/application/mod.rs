pub mod commands;
pub mod events;
pub mod evse;
pub mod hierarchy;
pub mod reservations;
pub mod sessions;
pub mod status_cache;

// Re-export key types for convenience
pub use commands::{FallbackChain, HopLevel, RemoteController, SharedController};
pub use events::{create_event_bus, EventBus, EventSink, EventSubscriber, SharedEventBus};
pub use evse::{Evse, EvseBuilder, EvseKind, EvseSettings};
pub use hierarchy::{ChargingPool, ChargingStation, ChargingStationOperator};
pub use reservations::{ReservationStore, ReservePolicy};
pub use sessions::SessionLifecycle;
pub use status_cache::{CachedStatus, EvseStatusCache};
