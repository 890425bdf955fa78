//! EVSE commands
//!
//! Each command checks location and admin status, then resolves the fallback
//! chain once: an attached controller first, then the local engine of a
//! virtual EVSE, then station, pool, operator and roaming provider. A remote
//! hop's answer is forwarded unchanged; when it is a success the EVSE mirrors
//! the outcome into its own bookkeeping.

use tracing::{debug, info, warn};

use super::aggregate::{Evse, EvseState};
use crate::application::commands::{run_command, Answer, CommandScope, Executor};
use crate::domain::commands::{
    AuthStartResult, AuthStopResult, AuthorizeStartRequest, AuthorizeStopRequest,
    CancelReservationRequest, CancelReservationResult, CommandKind, CommandOptions,
    CommandResponse, HopLevel, RemoteStartRequest, RemoteStartResult, RemoteStopRequest,
    RemoteStopResult, ReservationResult, ReserveRequest,
};
use crate::domain::events::{
    ChargeDetailRecordEvent, Event, ReservationCancelledEvent, ReservationCreatedEvent,
    SessionStartedEvent,
};
use crate::domain::ids::{EvseId, ReservationId};
use crate::domain::reservation::{CancelReservationReason, Reservation};
use crate::domain::session::{ChargeDetailRecord, ChargingSession, ReservationHandling};

impl Evse {
    fn scope(&self, command: CommandKind) -> CommandScope<'_> {
        CommandScope {
            evse_id: &self.inner.id,
            command,
            bus: &self.inner.bus,
            clock: &*self.inner.clock,
        }
    }

    /// `false` when the request targets a different EVSE.
    fn is_here(&self, location: Option<&EvseId>) -> bool {
        location.map_or(true, |id| id == &self.inner.id)
    }

    // ─── Reserve ───────────────────────────────────────────────────────

    pub async fn reserve(
        &self,
        request: ReserveRequest,
        options: CommandOptions,
    ) -> CommandResponse<ReservationResult> {
        run_command(self.scope(CommandKind::Reserve), &options, async {
            if !self.is_here(request.location.as_ref()) {
                return Answer::precondition(ReservationResult::UnknownLocation);
            }
            if !self.admin_status().accepts_commands() {
                return Answer::precondition(ReservationResult::OutOfService);
            }
            match self.route(true) {
                None => Answer::offline(),
                Some(Executor::Local) => {
                    Answer::by(HopLevel::Local, self.reserve_locally(&request).await)
                }
                Some(Executor::Remote { level, controller }) => {
                    let reply = controller.reserve(&self.inner.id, &request).await;
                    let answer = Answer::from_controller(level, controller.id(), reply);
                    if let ReservationResult::Success(reservation) = &answer.result {
                        self.mirror_reservation(reservation).await;
                    }
                    answer
                }
            }
        })
        .await
    }

    async fn reserve_locally(&self, request: &ReserveRequest) -> ReservationResult {
        let policy = self.inner.settings.reserve_policy();
        let mut events = Vec::new();
        let result = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let status = self.operational_status();
            match state.reservations.reserve(request, status, &policy, now) {
                Ok(outcome) => {
                    info!(
                        evse_id = %self.inner.id,
                        reservation_id = %outcome.reservation.id,
                        updated = outcome.updated,
                        end_time = %outcome.reservation.end_time(),
                        "Reservation accepted"
                    );
                    events.push(Event::ReservationCreated(ReservationCreatedEvent {
                        evse_id: self.inner.id.clone(),
                        reservation: outcome.reservation.clone(),
                        updated: outcome.updated,
                    }));
                    self.sync_status(&state, now, &mut events);
                    ReservationResult::Success(outcome.reservation)
                }
                Err(rejected) => {
                    debug!(evse_id = %self.inner.id, %status, result = ?rejected, "Reservation rejected");
                    rejected
                }
            }
        };
        self.publish(events);
        result
    }

    async fn mirror_reservation(&self, reservation: &Reservation) {
        if reservation.evse_id != self.inner.id {
            warn!(evse_id = %self.inner.id, other = %reservation.evse_id, "Delegated reservation is for another EVSE, not mirrored");
            return;
        }
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let updated = state.reservations.upsert(reservation.clone()).is_some();
            events.push(Event::ReservationCreated(ReservationCreatedEvent {
                evse_id: self.inner.id.clone(),
                reservation: reservation.clone(),
                updated,
            }));
            self.sync_status(&state, now, &mut events);
        }
        self.publish(events);
    }

    // ─── CancelReservation ─────────────────────────────────────────────

    pub async fn cancel_reservation(
        &self,
        request: CancelReservationRequest,
        options: CommandOptions,
    ) -> CommandResponse<CancelReservationResult> {
        run_command(self.scope(CommandKind::CancelReservation), &options, async {
            if !self.admin_status().accepts_commands() {
                return Answer::precondition(CancelReservationResult::OutOfService);
            }
            match self.route(true) {
                None => Answer::offline(),
                Some(Executor::Local) => {
                    Answer::by(HopLevel::Local, self.cancel_locally(&request).await)
                }
                Some(Executor::Remote { level, controller }) => {
                    let reply = controller.cancel_reservation(&self.inner.id, &request).await;
                    let answer = Answer::from_controller(level, controller.id(), reply);
                    if let CancelReservationResult::Success(reservation) = &answer.result {
                        self.remove_reservation(&reservation.id, request.reason).await;
                    }
                    answer
                }
            }
        })
        .await
    }

    async fn cancel_locally(&self, request: &CancelReservationRequest) -> CancelReservationResult {
        match self.remove_reservation(&request.reservation_id, request.reason).await {
            Some(reservation) => CancelReservationResult::Success(reservation),
            None => CancelReservationResult::UnknownReservationId,
        }
    }

    async fn remove_reservation(
        &self,
        id: &ReservationId,
        reason: CancelReservationReason,
    ) -> Option<Reservation> {
        let mut events = Vec::new();
        let removed = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let removed = state.reservations.remove(id);
            if let Some(reservation) = &removed {
                info!(evse_id = %self.inner.id, reservation_id = %reservation.id, %reason, "Reservation cancelled");
                events.push(Event::ReservationCancelled(ReservationCancelledEvent {
                    evse_id: self.inner.id.clone(),
                    reservation: reservation.clone(),
                    reason,
                }));
                self.sync_status(&state, now, &mut events);
            }
            removed
        };
        self.publish(events);
        removed
    }

    // ─── Expiry ────────────────────────────────────────────────────────

    /// Remove every reservation whose end time has passed.
    ///
    /// Runs automatically on virtual EVSEs; calling it by hand is harmless.
    pub async fn check_reservation_expiry(&self) -> Vec<Reservation> {
        let mut events = Vec::new();
        let expired = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let expired = state.reservations.take_expired(now);
            for reservation in &expired {
                info!(evse_id = %self.inner.id, reservation_id = %reservation.id, "Reservation expired");
                events.push(Event::ReservationCancelled(ReservationCancelledEvent {
                    evse_id: self.inner.id.clone(),
                    reservation: reservation.clone(),
                    reason: CancelReservationReason::Expired,
                }));
            }
            if !expired.is_empty() {
                self.sync_status(&state, now, &mut events);
            }
            expired
        };
        self.publish(events);
        expired
    }

    // ─── RemoteStart ───────────────────────────────────────────────────

    pub async fn remote_start(
        &self,
        request: RemoteStartRequest,
        options: CommandOptions,
    ) -> CommandResponse<RemoteStartResult> {
        run_command(self.scope(CommandKind::RemoteStart), &options, async {
            if !self.is_here(request.location.as_ref()) {
                return Answer::precondition(RemoteStartResult::UnknownLocation);
            }
            if !self.admin_status().accepts_commands() {
                return Answer::precondition(RemoteStartResult::OutOfService);
            }
            match self.route(true) {
                None => Answer::offline(),
                Some(Executor::Local) => {
                    Answer::by(HopLevel::Local, self.start_locally(&request).await)
                }
                Some(Executor::Remote { level, controller }) => {
                    let reply = controller.remote_start(&self.inner.id, &request).await;
                    let answer = Answer::from_controller(level, controller.id(), reply);
                    if let RemoteStartResult::Success(session) = &answer.result {
                        self.mirror_session_start(session).await;
                    }
                    answer
                }
            }
        })
        .await
    }

    async fn start_locally(&self, request: &RemoteStartRequest) -> RemoteStartResult {
        let mut events = Vec::new();
        let result = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let status = self.operational_status();
            let EvseState {
                reservations,
                sessions,
            } = &mut *state;
            match sessions.start(request, status, reservations, now) {
                Ok(session) => {
                    info!(
                        evse_id = %self.inner.id,
                        session_id = %session.id,
                        reservation_id = ?session.reservation_id,
                        "Charging session started"
                    );
                    events.push(Event::SessionStarted(SessionStartedEvent {
                        evse_id: self.inner.id.clone(),
                        session: session.clone(),
                    }));
                    self.sync_status(&state, now, &mut events);
                    self.arm_metering();
                    RemoteStartResult::Success(session)
                }
                Err(rejected) => {
                    debug!(evse_id = %self.inner.id, %status, result = ?rejected, "Remote start rejected");
                    rejected
                }
            }
        };
        self.publish(events);
        result
    }

    async fn mirror_session_start(&self, session: &ChargingSession) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            if let Some(reservation_id) = &session.reservation_id {
                state
                    .reservations
                    .consume(reservation_id, now, session.id.clone());
            }
            if let Some(previous) = state.sessions.adopt(session.clone()) {
                warn!(evse_id = %self.inner.id, previous = %previous.id, "Delegated session replaced an active one");
            }
            events.push(Event::SessionStarted(SessionStartedEvent {
                evse_id: self.inner.id.clone(),
                session: session.clone(),
            }));
            self.sync_status(&state, now, &mut events);
        }
        self.publish(events);
    }

    // ─── RemoteStop ────────────────────────────────────────────────────

    pub async fn remote_stop(
        &self,
        request: RemoteStopRequest,
        options: CommandOptions,
    ) -> CommandResponse<RemoteStopResult> {
        run_command(self.scope(CommandKind::RemoteStop), &options, async {
            if !self.is_here(request.location.as_ref()) {
                return Answer::precondition(RemoteStopResult::UnknownLocation);
            }
            match self.route(true) {
                None => Answer::offline(),
                Some(Executor::Local) => {
                    Answer::by(HopLevel::Local, self.stop_locally(&request).await)
                }
                Some(Executor::Remote { level, controller }) => {
                    let reply = controller.remote_stop(&self.inner.id, &request).await;
                    let answer = Answer::from_controller(level, controller.id(), reply);
                    if let RemoteStopResult::Success(cdr) = &answer.result {
                        self.mirror_session_stop(cdr, request.reservation_handling)
                            .await;
                    }
                    answer
                }
            }
        })
        .await
    }

    async fn stop_locally(&self, request: &RemoteStopRequest) -> RemoteStopResult {
        let mut events = Vec::new();
        let result = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let EvseState {
                reservations,
                sessions,
            } = &mut *state;
            match sessions.stop(request, reservations, now) {
                Ok(outcome) => {
                    self.disarm_metering();
                    info!(
                        evse_id = %self.inner.id,
                        session_id = %outcome.cdr.session_id,
                        energy_wh = outcome.cdr.energy_wh,
                        duration_secs = outcome.cdr.duration.num_seconds(),
                        "Charging session stopped"
                    );
                    events.extend(self.stop_events(&outcome));
                    self.sync_status(&state, now, &mut events);
                    RemoteStopResult::Success(outcome.cdr)
                }
                Err(rejected) => {
                    debug!(evse_id = %self.inner.id, session_id = %request.session_id, "Remote stop for unknown session");
                    rejected
                }
            }
        };
        self.publish(events);
        result
    }

    async fn mirror_session_stop(&self, cdr: &ChargeDetailRecord, handling: ReservationHandling) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            if state.sessions.clear(&cdr.session_id).is_some() {
                self.disarm_metering();
            }
            if let Some(reservation_id) = &cdr.reservation_id {
                match handling {
                    ReservationHandling::Close => {
                        if let Some(reservation) = state.reservations.remove(reservation_id) {
                            events.push(Event::ReservationCancelled(ReservationCancelledEvent {
                                evse_id: self.inner.id.clone(),
                                reservation,
                                reason: CancelReservationReason::Consumed,
                            }));
                        }
                    }
                    ReservationHandling::KeepAlive => state.reservations.release(reservation_id),
                }
            }
            events.push(Event::ChargeDetailRecordCreated(ChargeDetailRecordEvent {
                evse_id: self.inner.id.clone(),
                cdr: cdr.clone(),
            }));
            self.sync_status(&state, now, &mut events);
        }
        self.publish(events);
    }

    // ─── Authorization ─────────────────────────────────────────────────

    /// Side-effect free. A virtual EVSE answers itself only when it has a
    /// local authorization list; otherwise the check goes up the chain.
    pub async fn authorize_start(
        &self,
        request: AuthorizeStartRequest,
        options: CommandOptions,
    ) -> CommandResponse<AuthStartResult> {
        run_command(self.scope(CommandKind::AuthorizeStart), &options, async {
            if !self.is_here(request.location.as_ref()) {
                return Answer::precondition(AuthStartResult::UnknownLocation);
            }
            if !self.admin_status().accepts_commands() {
                return Answer::precondition(AuthStartResult::OutOfService);
            }
            let local_list = self.inner.settings.local_auth_list.as_ref();
            match self.route(local_list.is_some()) {
                None => Answer::offline(),
                Some(Executor::Local) => {
                    let authorized = local_list.is_some_and(|list| list.contains(&request.auth_identity));
                    let result = if authorized {
                        AuthStartResult::Authorized {
                            provider_id: None,
                            session_id: request.session_id.clone(),
                        }
                    } else {
                        AuthStartResult::NotAuthorized
                    };
                    Answer::by(HopLevel::Local, result)
                }
                Some(Executor::Remote { level, controller }) => {
                    let reply = controller.authorize_start(&self.inner.id, &request).await;
                    Answer::from_controller(level, controller.id(), reply)
                }
            }
        })
        .await
    }

    pub async fn authorize_stop(
        &self,
        request: AuthorizeStopRequest,
        options: CommandOptions,
    ) -> CommandResponse<AuthStopResult> {
        run_command(self.scope(CommandKind::AuthorizeStop), &options, async {
            if !self.is_here(request.location.as_ref()) {
                return Answer::precondition(AuthStopResult::UnknownLocation);
            }
            let local_list = self.inner.settings.local_auth_list.as_ref();
            match self.route(local_list.is_some()) {
                None => Answer::offline(),
                Some(Executor::Local) => {
                    let state = self.inner.state.lock().await;
                    let result = match state.sessions.active() {
                        Some(session) if session.id == request.session_id => {
                            let starter = session.auth_start.as_ref() == Some(&request.auth_identity);
                            let listed = local_list.is_some_and(|list| list.contains(&request.auth_identity));
                            if starter || listed {
                                AuthStopResult::Authorized {
                                    provider_id: session.provider_start.clone(),
                                }
                            } else {
                                AuthStopResult::NotAuthorized
                            }
                        }
                        _ => AuthStopResult::InvalidSessionId,
                    };
                    Answer::by(HopLevel::Local, result)
                }
                Some(Executor::Remote { level, controller }) => {
                    let reply = controller.authorize_stop(&self.inner.id, &request).await;
                    Answer::from_controller(level, controller.id(), reply)
                }
            }
        })
        .await
    }
}
