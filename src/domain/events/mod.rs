//! Domain events
//!
//! Event types that represent facts about what happened to an EVSE.
//! The `EventBus` implementation lives in `application::events`.

pub mod types;

pub use types::{
    AdminStatusChangedEvent, ChargeDetailRecordEvent, CommandCompletedEvent,
    CommandRequestedEvent, Event, EventMessage, MeterSampleEvent, OperationalStatusChangedEvent,
    ReservationCancelledEvent, ReservationCreatedEvent, SessionStartedEvent,
};
