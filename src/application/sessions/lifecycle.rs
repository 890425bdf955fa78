//! Charging session lifecycle
//!
//! Owns the single active session of an EVSE. Starting checks the operational
//! status and the reservation held on the EVSE; stopping writes the Stop
//! sample, closes or keeps the consumed reservation and produces the charge
//! detail record. Like the reservation store this is plain data living under
//! the EVSE state mutex.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::application::reservations::ReservationStore;
use crate::domain::commands::{RemoteStartRequest, RemoteStartResult, RemoteStopRequest, RemoteStopResult};
use crate::domain::ids::{AuthIdentity, EvseId, ProviderId, SessionId};
use crate::domain::reservation::Reservation;
use crate::domain::session::{
    estimate_energy_wh, ChargeDetailRecord, ChargingSession, MeterSample, MeterSampleKind,
    ReservationHandling,
};
use crate::domain::status::OperationalStatus;

pub const STOP_REASON_REMOTE: &str = "Remote";
pub const STOP_REASON_RESET: &str = "Reset";

/// Result of ending a session
#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub cdr: ChargeDetailRecord,
    pub stop_sample: MeterSample,
    /// Reservation removed together with the session (`ReservationHandling::Close`)
    pub closed_reservation: Option<Reservation>,
}

/// Who ends a session and how
#[derive(Debug, Clone, Default)]
pub struct StopContext {
    pub provider_id: Option<ProviderId>,
    pub auth_identity: Option<AuthIdentity>,
    pub handling: ReservationHandling,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    evse_id: EvseId,
    /// Nominal power used to estimate energy when no real meter reports
    rated_power_kw: f64,
    active: Option<ChargingSession>,
}

impl SessionLifecycle {
    pub fn new(evse_id: EvseId, rated_power_kw: f64) -> Self {
        Self {
            evse_id,
            rated_power_kw,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&ChargingSession> {
        self.active.as_ref()
    }

    pub fn is_charging(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_active_session(&self, id: &SessionId) -> bool {
        self.active.as_ref().is_some_and(|s| &s.id == id)
    }

    /// Start a session if `status` and the held reservations allow it.
    ///
    /// From Reserved the earliest reservation must be named by the request and
    /// must allow the requesting identity; it is then consumed by the session.
    pub fn start(
        &mut self,
        request: &RemoteStartRequest,
        status: OperationalStatus,
        reservations: &mut ReservationStore,
        now: DateTime<Utc>,
    ) -> Result<ChargingSession, RemoteStartResult> {
        if self.active.is_some() {
            return Err(RemoteStartResult::AlreadyInUse);
        }

        match status {
            OperationalStatus::Available | OperationalStatus::Reserved => {}
            OperationalStatus::Charging => return Err(RemoteStartResult::AlreadyInUse),
            OperationalStatus::OutOfService => return Err(RemoteStartResult::OutOfService),
            OperationalStatus::Offline => return Err(RemoteStartResult::Offline),
            OperationalStatus::Faulted => {
                return Err(RemoteStartResult::Error("EVSE is faulted".to_string()))
            }
        }

        let session_id = request.session_id.clone().unwrap_or_else(SessionId::generate);

        let reservation_id = match reservations.earliest() {
            Some(reservation) => {
                if request.reservation_id.as_ref() != Some(&reservation.id) {
                    debug!(
                        evse_id = %self.evse_id,
                        reservation_id = %reservation.id,
                        "Remote start does not match the held reservation"
                    );
                    return Err(RemoteStartResult::Reserved);
                }
                let allowed = request
                    .auth_identity
                    .as_ref()
                    .is_some_and(|identity| reservation.allows(identity));
                if !allowed {
                    return Err(RemoteStartResult::InvalidCredentials);
                }
                let id = reservation.id.clone();
                reservations.consume(&id, now, session_id.clone());
                Some(id)
            }
            None => None,
        };

        let mut session = ChargingSession::start(session_id, self.evse_id.clone(), now);
        session.reservation_id = reservation_id;
        session.product = request.product.clone();
        session.provider_start = request.provider_id.clone();
        session.auth_start = request.auth_identity.clone();

        self.active = Some(session.clone());
        Ok(session)
    }

    /// Stop the active session named by `request`.
    pub fn stop(
        &mut self,
        request: &RemoteStopRequest,
        reservations: &mut ReservationStore,
        now: DateTime<Utc>,
    ) -> Result<StopOutcome, RemoteStopResult> {
        if !self.is_active_session(&request.session_id) {
            return Err(RemoteStopResult::InvalidSessionId);
        }
        let ctx = StopContext {
            provider_id: request.provider_id.clone(),
            auth_identity: request.auth_identity.clone(),
            handling: request.reservation_handling,
            reason: Some(STOP_REASON_REMOTE.to_string()),
        };
        self.finish(ctx, reservations, now)
            .ok_or(RemoteStopResult::InvalidSessionId)
    }

    /// End whatever session is active, e.g. on administrative reset.
    pub fn terminate(
        &mut self,
        reason: &str,
        reservations: &mut ReservationStore,
        now: DateTime<Utc>,
    ) -> Option<StopOutcome> {
        let ctx = StopContext {
            reason: Some(reason.to_string()),
            ..StopContext::default()
        };
        self.finish(ctx, reservations, now)
    }

    fn finish(
        &mut self,
        ctx: StopContext,
        reservations: &mut ReservationStore,
        now: DateTime<Utc>,
    ) -> Option<StopOutcome> {
        let mut session = self.active.take()?;

        let stopped_at = session
            .last_sample()
            .map_or(session.started_at, |s| s.timestamp)
            .max(now);
        let energy = estimate_energy_wh(self.rated_power_kw, stopped_at - session.started_at);
        session.record_sample(MeterSampleKind::Stop, stopped_at, energy);
        let stop_sample = session.last_sample().cloned()?;
        session.stopped_at = Some(stop_sample.timestamp);
        session.provider_stop = ctx.provider_id;
        session.auth_stop = ctx.auth_identity;

        let closed_reservation = match (&session.reservation_id, ctx.handling) {
            (Some(id), ReservationHandling::Close) => reservations.remove(id),
            (Some(id), ReservationHandling::KeepAlive) => {
                reservations.release(id);
                None
            }
            (None, _) => None,
        };

        Some(StopOutcome {
            cdr: ChargeDetailRecord::from_session(&session, ctx.reason),
            stop_sample,
            closed_reservation,
        })
    }

    /// Record an Intermediate sample for the active session.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<(SessionId, MeterSample)> {
        let power = self.rated_power_kw;
        let session = self.active.as_mut()?;
        let energy = estimate_energy_wh(power, now - session.started_at);
        if !session.record_sample(MeterSampleKind::Intermediate, now, energy) {
            return None;
        }
        let sample = session.last_sample()?.clone();
        Some((session.id.clone(), sample))
    }

    /// Take over a session that an upstream controller started for this EVSE.
    pub fn adopt(&mut self, session: ChargingSession) -> Option<ChargingSession> {
        self.active.replace(session)
    }

    /// Drop the active session without a record; used when an upstream
    /// controller already stopped it.
    pub fn clear(&mut self, id: &SessionId) -> Option<ChargingSession> {
        if self.is_active_session(id) {
            self.active.take()
        } else {
            None
        }
    }
}
