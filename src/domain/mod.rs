pub mod commands;
pub mod error;
pub mod events;
pub mod ids;
pub mod reservation;
pub mod session;
pub mod status;
pub mod status_history;

// Re-export commonly used types
pub use commands::{
    AuthStartResult, AuthStopResult, AuthorizeStartRequest, AuthorizeStopRequest,
    CancelReservationRequest, CancelReservationResult, CommandKind, CommandOptions,
    CommandResponse, CommandResult, HopLevel, RemoteStartRequest, RemoteStartResult,
    RemoteStopRequest, RemoteStopResult, ReservationResult, ReserveRequest,
};
pub use error::{ControllerError, ControllerResult};
pub use events::{Event, EventMessage};
pub use ids::{
    AuthIdentity, EvseId, OperatorId, PoolId, ProductId, ProviderId, ReservationId, SessionId,
    StationId,
};
pub use reservation::{CancelReservationReason, Reservation, ReservationLevel};
pub use session::{
    ChargeDetailRecord, ChargingSession, MeterSample, MeterSampleKind, ReservationHandling,
};
pub use status::{AdminStatus, OperationalStatus};
pub use status_history::{StatusChange, StatusEntry, StatusHistory};
