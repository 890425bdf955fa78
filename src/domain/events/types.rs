//! Notification events
//!
//! Everything an EVSE publishes: status changes, reservation and session
//! lifecycle, and the request/response audit pair around each command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::commands::{CommandKind, HopLevel};
use crate::domain::ids::{EvseId, SessionId};
use crate::domain::reservation::{CancelReservationReason, Reservation};
use crate::domain::session::{ChargeDetailRecord, ChargingSession, MeterSample};
use crate::domain::status::{AdminStatus, OperationalStatus};
use crate::domain::status_history::StatusEntry;

/// Event types for notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    AdminStatusChanged(AdminStatusChangedEvent),
    OperationalStatusChanged(OperationalStatusChangedEvent),
    /// New reservation, or renewal of an existing one
    ReservationCreated(ReservationCreatedEvent),
    ReservationCancelled(ReservationCancelledEvent),
    SessionStarted(SessionStartedEvent),
    MeterSampleRecorded(MeterSampleEvent),
    ChargeDetailRecordCreated(ChargeDetailRecordEvent),
    CommandRequested(CommandRequestedEvent),
    CommandCompleted(CommandCompletedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::AdminStatusChanged(_) => "admin_status_changed",
            Event::OperationalStatusChanged(_) => "operational_status_changed",
            Event::ReservationCreated(_) => "reservation_created",
            Event::ReservationCancelled(_) => "reservation_cancelled",
            Event::SessionStarted(_) => "session_started",
            Event::MeterSampleRecorded(_) => "meter_sample_recorded",
            Event::ChargeDetailRecordCreated(_) => "charge_detail_record_created",
            Event::CommandRequested(_) => "command_requested",
            Event::CommandCompleted(_) => "command_completed",
        }
    }

    pub fn evse_id(&self) -> &EvseId {
        match self {
            Event::AdminStatusChanged(e) => &e.evse_id,
            Event::OperationalStatusChanged(e) => &e.evse_id,
            Event::ReservationCreated(e) => &e.evse_id,
            Event::ReservationCancelled(e) => &e.evse_id,
            Event::SessionStarted(e) => &e.evse_id,
            Event::MeterSampleRecorded(e) => &e.evse_id,
            Event::ChargeDetailRecordCreated(e) => &e.evse_id,
            Event::CommandRequested(e) => &e.evse_id,
            Event::CommandCompleted(e) => &e.evse_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStatusChangedEvent {
    pub evse_id: EvseId,
    pub old: StatusEntry<AdminStatus>,
    pub new: StatusEntry<AdminStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalStatusChangedEvent {
    pub evse_id: EvseId,
    pub old: StatusEntry<OperationalStatus>,
    pub new: StatusEntry<OperationalStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationCreatedEvent {
    pub evse_id: EvseId,
    pub reservation: Reservation,
    /// `true` when an existing reservation was renewed
    pub updated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationCancelledEvent {
    pub evse_id: EvseId,
    pub reservation: Reservation,
    pub reason: CancelReservationReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStartedEvent {
    pub evse_id: EvseId,
    pub session: ChargingSession,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSampleEvent {
    pub evse_id: EvseId,
    pub session_id: SessionId,
    pub sample: MeterSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeDetailRecordEvent {
    pub evse_id: EvseId,
    pub cdr: ChargeDetailRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequestedEvent {
    pub evse_id: EvseId,
    pub command: CommandKind,
    /// Correlates the request with its `CommandCompleted`
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCompletedEvent {
    pub evse_id: EvseId,
    pub command: CommandKind,
    pub request_id: String,
    pub result: String,
    pub executed_by: Option<HopLevel>,
    pub runtime_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_type_tag() {
        let now = Utc::now();
        let msg = EventMessage::new(Event::CommandRequested(CommandRequestedEvent {
            evse_id: EvseId::new("EVSE-1"),
            command: CommandKind::Reserve,
            request_id: "req-1".into(),
            timestamp: now,
        }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "CommandRequested");
        assert_eq!(json["data"]["evse_id"], "EVSE-1");
        assert_eq!(msg.event.event_type(), "command_requested");
        assert_eq!(msg.event.evse_id().as_str(), "EVSE-1");
    }
}
