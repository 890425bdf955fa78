//! The EVSE aggregate
//!
//! An [`Evse`] owns its status histories, its reservation table and its
//! active session. Reservation and session state live behind one async mutex;
//! the status histories sit behind read-write locks so status queries never
//! wait for a command in progress. Events produced under the mutex are
//! published only after it is released.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::settings::EvseSettings;
use super::tasks;
use crate::application::commands::{Executor, FallbackChain, SharedController};
use crate::application::events::{EventSubscriber, SharedEventBus};
use crate::application::hierarchy::ChargingStation;
use crate::application::reservations::ReservationStore;
use crate::application::sessions::{SessionLifecycle, StopOutcome, STOP_REASON_RESET};
use crate::domain::commands::HopLevel;
use crate::domain::events::{
    AdminStatusChangedEvent, ChargeDetailRecordEvent, Event, MeterSampleEvent,
    OperationalStatusChangedEvent, ReservationCancelledEvent,
};
use crate::domain::ids::EvseId;
use crate::domain::reservation::{CancelReservationReason, Reservation};
use crate::domain::session::{ChargeDetailRecord, ChargingSession};
use crate::domain::status::{AdminStatus, OperationalStatus};
use crate::domain::status_history::{StatusChange, StatusEntry, StatusHistory};
use crate::shared::{CancellationSignal, InFlightGuard, ScheduledTask, SharedClock, SystemClock};

/// Source recorded for status changes the engine derives itself
pub const ENGINE_SOURCE: &str = "engine";

/// How an EVSE executes commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvseKind {
    /// Simulated EVSE with its own execution engine
    Virtual,
    /// Stand-in for remote hardware; everything is delegated
    Proxy,
}

/// Reservation table and session pointer, guarded together
#[derive(Debug)]
pub(super) struct EvseState {
    pub(super) reservations: ReservationStore,
    pub(super) sessions: SessionLifecycle,
}

impl EvseState {
    /// Operational status implied by the engine state alone.
    pub(super) fn derived_status(&self) -> OperationalStatus {
        if self.sessions.is_charging() {
            OperationalStatus::Charging
        } else if !self.reservations.is_empty() {
            OperationalStatus::Reserved
        } else {
            OperationalStatus::Available
        }
    }
}

#[derive(Default)]
pub(super) struct EvseTasks {
    pub(super) expiry: Option<ScheduledTask>,
    pub(super) metering: Option<ScheduledTask>,
}

pub(super) struct EvseInner {
    pub(super) id: EvseId,
    pub(super) kind: EvseKind,
    pub(super) settings: EvseSettings,
    pub(super) clock: SharedClock,
    pub(super) bus: SharedEventBus,
    pub(super) controller: Option<SharedController>,
    pub(super) station: RwLock<Weak<ChargingStation>>,
    pub(super) admin: RwLock<StatusHistory<AdminStatus>>,
    pub(super) operational: RwLock<StatusHistory<OperationalStatus>>,
    pub(super) state: AsyncMutex<EvseState>,
    /// Fired when the last handle is dropped; background tasks stop with it
    pub(super) lifetime: CancellationSignal,
    pub(super) metering_guard: InFlightGuard,
    pub(super) tasks: Mutex<EvseTasks>,
}

impl Drop for EvseInner {
    fn drop(&mut self) {
        self.lifetime.cancel();
        debug!(evse_id = %self.id, "EVSE dropped, background tasks stopped");
    }
}

/// Handle to one EVSE; cheap to clone
#[derive(Clone)]
pub struct Evse {
    pub(super) inner: Arc<EvseInner>,
}

impl std::fmt::Debug for Evse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evse")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("admin_status", &self.admin_status())
            .field("operational_status", &self.operational_status())
            .finish()
    }
}

impl Evse {
    pub fn builder(id: impl Into<EvseId>) -> EvseBuilder {
        EvseBuilder::new(id)
    }

    pub fn id(&self) -> &EvseId {
        &self.inner.id
    }

    pub fn kind(&self) -> EvseKind {
        self.inner.kind
    }

    pub fn settings(&self) -> &EvseSettings {
        &self.inner.settings
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.inner.bus.subscribe()
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // ─── Hierarchy ─────────────────────────────────────────────────────

    pub fn station(&self) -> Option<Arc<ChargingStation>> {
        self.inner.station.read().upgrade()
    }

    pub(crate) fn attach_station(&self, station: Weak<ChargingStation>) {
        *self.inner.station.write() = station;
    }

    pub(crate) fn detach_station(&self) {
        *self.inner.station.write() = Weak::new();
    }

    /// Executors for this call, most specific first.
    pub fn fallback_chain(&self) -> FallbackChain {
        let mut chain = FallbackChain::new();
        chain.push_remote(HopLevel::EvseController, self.inner.controller.clone());
        if self.inner.kind == EvseKind::Virtual {
            chain.push_local();
        }
        if let Some(station) = self.station() {
            station.extend_chain(&mut chain);
        }
        chain
    }

    /// First executor allowed to answer; `local_capable` is false for
    /// commands the local engine cannot answer in the current setup.
    pub(super) fn route(&self, local_capable: bool) -> Option<Executor> {
        let chain = self.fallback_chain();
        let hop = chain
            .first_where(|hop| local_capable || !matches!(hop, Executor::Local))
            .cloned();
        debug!(
            evse_id = %self.inner.id,
            hops = ?chain.levels(),
            selected = ?hop.as_ref().map(Executor::level),
            "Fallback chain resolved"
        );
        hop
    }

    // ─── Status ────────────────────────────────────────────────────────

    pub fn admin_status(&self) -> AdminStatus {
        self.inner.admin.read().value()
    }

    pub fn admin_status_entry(&self) -> StatusEntry<AdminStatus> {
        self.inner.admin.read().current().clone()
    }

    pub fn admin_status_history(&self, max_count: usize) -> Vec<StatusEntry<AdminStatus>> {
        self.inner.admin.read().snapshot(max_count)
    }

    pub fn operational_status(&self) -> OperationalStatus {
        self.inner.operational.read().value()
    }

    pub fn operational_status_entry(&self) -> StatusEntry<OperationalStatus> {
        self.inner.operational.read().current().clone()
    }

    pub fn operational_status_history(
        &self,
        max_count: usize,
    ) -> Vec<StatusEntry<OperationalStatus>> {
        self.inner.operational.read().snapshot(max_count)
    }

    /// Record a new admin status. Older timestamps and unchanged values are
    /// ignored.
    pub fn set_admin_status(
        &self,
        status: AdminStatus,
        timestamp: Option<DateTime<Utc>>,
        source: Option<String>,
    ) -> Option<StatusChange<AdminStatus>> {
        let timestamp = timestamp.unwrap_or_else(|| self.now());
        let change = self.inner.admin.write().insert(status, timestamp, source)?;
        info!(evse_id = %self.inner.id, old = %change.old.value, new = %change.new.value, "Admin status changed");
        self.inner
            .bus
            .publish(Event::AdminStatusChanged(AdminStatusChangedEvent {
                evse_id: self.inner.id.clone(),
                old: change.old.clone(),
                new: change.new.clone(),
            }));
        Some(change)
    }

    /// Apply a status reported by hardware.
    ///
    /// OutOfService, Offline and Faulted are taken as reported. Any of the
    /// engine-driven values means "recovered": the status is re-derived from
    /// the reservations and session held.
    pub async fn report_operational_status(
        &self,
        reported: OperationalStatus,
        source: impl Into<String>,
    ) -> Option<StatusChange<OperationalStatus>> {
        let change = {
            let state = self.inner.state.lock().await;
            let value = if reported.is_engine_derived() {
                state.derived_status()
            } else {
                reported
            };
            let now = self.now();
            self.inner
                .operational
                .write()
                .insert(value, now, Some(source.into()))
        }?;
        self.publish_operational_change(&change);
        Some(change)
    }

    /// Move an engine-driven status to what `state` implies. Hardware
    /// statuses are left alone until hardware reports recovery.
    pub(super) fn sync_status(&self, state: &EvseState, now: DateTime<Utc>, events: &mut Vec<Event>) {
        let mut history = self.inner.operational.write();
        if !history.value().is_engine_derived() {
            return;
        }
        if let Some(change) = history.insert(state.derived_status(), now, Some(ENGINE_SOURCE.to_string())) {
            events.push(operational_event(&self.inner.id, &change));
        }
    }

    fn publish_operational_change(&self, change: &StatusChange<OperationalStatus>) {
        info!(evse_id = %self.inner.id, old = %change.old.value, new = %change.new.value, "Operational status changed");
        self.inner.bus.publish(operational_event(&self.inner.id, change));
    }

    pub(super) fn publish(&self, events: Vec<Event>) {
        for event in &events {
            if let Event::OperationalStatusChanged(e) = event {
                info!(evse_id = %self.inner.id, old = %e.old.value, new = %e.new.value, "Operational status changed");
            }
        }
        self.inner.bus.publish_all(events);
    }

    // ─── Snapshots ─────────────────────────────────────────────────────

    pub async fn reservations(&self) -> Vec<Reservation> {
        self.inner.state.lock().await.reservations.all()
    }

    pub async fn active_session(&self) -> Option<ChargingSession> {
        self.inner.state.lock().await.sessions.active().cloned()
    }

    // ─── Administrative reset ──────────────────────────────────────────

    /// Terminate the active session locally, without asking any controller.
    pub async fn reset(&self) -> Option<ChargeDetailRecord> {
        let mut events = Vec::new();
        let outcome = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let EvseState {
                reservations,
                sessions,
            } = &mut *state;
            let outcome = sessions.terminate(STOP_REASON_RESET, reservations, now);
            if let Some(outcome) = &outcome {
                self.disarm_metering();
                events.extend(self.stop_events(outcome));
                self.sync_status(&state, now, &mut events);
            }
            outcome
        };
        self.publish(events);

        match outcome {
            Some(outcome) => {
                warn!(evse_id = %self.inner.id, session_id = %outcome.cdr.session_id, "Session terminated by reset");
                Some(outcome.cdr)
            }
            None => {
                debug!(evse_id = %self.inner.id, "Reset without active session");
                None
            }
        }
    }

    pub(super) fn stop_events(&self, outcome: &StopOutcome) -> Vec<Event> {
        let mut events = vec![Event::MeterSampleRecorded(MeterSampleEvent {
            evse_id: self.inner.id.clone(),
            session_id: outcome.cdr.session_id.clone(),
            sample: outcome.stop_sample.clone(),
        })];
        if let Some(reservation) = &outcome.closed_reservation {
            events.push(Event::ReservationCancelled(ReservationCancelledEvent {
                evse_id: self.inner.id.clone(),
                reservation: reservation.clone(),
                reason: CancelReservationReason::Consumed,
            }));
        }
        events.push(Event::ChargeDetailRecordCreated(ChargeDetailRecordEvent {
            evse_id: self.inner.id.clone(),
            cdr: outcome.cdr.clone(),
        }));
        events
    }

    // ─── Background tasks ──────────────────────────────────────────────

    pub(super) fn arm_metering(&self) {
        let task = tasks::spawn_metering(&self.inner);
        if let Some(previous) = self.inner.tasks.lock().metering.replace(task) {
            previous.stop();
        }
    }

    pub(super) fn disarm_metering(&self) {
        if let Some(task) = self.inner.tasks.lock().metering.take() {
            task.stop();
            debug!(evse_id = %self.inner.id, "Metering disarmed");
        }
    }

    pub fn is_metering(&self) -> bool {
        self.inner
            .tasks
            .lock()
            .metering
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

fn operational_event(evse_id: &EvseId, change: &StatusChange<OperationalStatus>) -> Event {
    Event::OperationalStatusChanged(OperationalStatusChangedEvent {
        evse_id: evse_id.clone(),
        old: change.old.clone(),
        new: change.new.clone(),
    })
}

// ─── Builder ───────────────────────────────────────────────────────────

pub struct EvseBuilder {
    id: EvseId,
    kind: EvseKind,
    settings: EvseSettings,
    clock: Option<SharedClock>,
    bus: Option<SharedEventBus>,
    controller: Option<SharedController>,
    admin_status: AdminStatus,
    operational_status: OperationalStatus,
}

impl EvseBuilder {
    /// A virtual EVSE with default settings.
    pub fn new(id: impl Into<EvseId>) -> Self {
        Self {
            id: id.into(),
            kind: EvseKind::Virtual,
            settings: EvseSettings::default(),
            clock: None,
            bus: None,
            controller: None,
            admin_status: AdminStatus::Operational,
            operational_status: OperationalStatus::Available,
        }
    }

    /// Delegate every command instead of executing locally.
    pub fn proxy(mut self) -> Self {
        self.kind = EvseKind::Proxy;
        self
    }

    pub fn with_settings(mut self, settings: EvseSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_controller(mut self, controller: SharedController) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_admin_status(mut self, status: AdminStatus) -> Self {
        self.admin_status = status;
        self
    }

    pub fn with_operational_status(mut self, status: OperationalStatus) -> Self {
        self.operational_status = status;
        self
    }

    /// Build the EVSE. Inside a tokio runtime the reservation expiry sweep
    /// starts right away; a proxy needs it too for mirrored reservations.
    pub fn build(self) -> Evse {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let bus = self
            .bus
            .unwrap_or_else(crate::application::events::create_event_bus);
        let now = clock.now();
        let history_size = self.settings.status_history_size;

        let inner = Arc::new(EvseInner {
            id: self.id.clone(),
            kind: self.kind,
            clock,
            bus,
            controller: self.controller,
            station: RwLock::new(Weak::new()),
            admin: RwLock::new(StatusHistory::with_max_len(self.admin_status, now, history_size)),
            operational: RwLock::new(StatusHistory::with_max_len(
                self.operational_status,
                now,
                history_size,
            )),
            state: AsyncMutex::new(EvseState {
                reservations: ReservationStore::new(self.id.clone()),
                sessions: SessionLifecycle::new(self.id.clone(), self.settings.rated_power_kw),
            }),
            lifetime: CancellationSignal::new(),
            metering_guard: InFlightGuard::new(),
            tasks: Mutex::new(EvseTasks::default()),
            settings: self.settings,
        });

        let evse = Evse { inner };
        if tokio::runtime::Handle::try_current().is_ok() {
            let task = tasks::spawn_expiry_sweep(&evse.inner);
            evse.inner.tasks.lock().expiry = Some(task);
        } else {
            warn!(evse_id = %evse.inner.id, "No tokio runtime, reservation expiry sweep not started");
        }
        info!(evse_id = %evse.inner.id, kind = ?evse.inner.kind, "EVSE created");
        evse
    }
}
