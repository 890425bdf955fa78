//! Per-EVSE reservation table
//!
//! The store is plain data guarded by the EVSE's state mutex; it never locks
//! or publishes anything itself. Callers turn the returned reservations into
//! events once the lock is released.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::commands::{ReservationResult, ReserveRequest};
use crate::domain::ids::{EvseId, ReservationId, SessionId};
use crate::domain::reservation::{Reservation, ReservationLevel};
use crate::domain::status::OperationalStatus;

/// Limits applied to incoming reservations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservePolicy {
    pub default_duration: Duration,
    pub max_duration: Duration,
    pub allow_while_charging: bool,
}

impl Default for ReservePolicy {
    fn default() -> Self {
        Self {
            default_duration: Duration::minutes(15),
            max_duration: Duration::minutes(15),
            allow_while_charging: false,
        }
    }
}

impl ReservePolicy {
    /// Requested duration, or the default, capped at the maximum.
    pub fn effective_duration(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_duration)
            .min(self.max_duration)
    }
}

/// Successful reserve
#[derive(Debug, Clone, PartialEq)]
pub struct ReserveOutcome {
    pub reservation: Reservation,
    /// `true` when an existing reservation was renewed
    pub updated: bool,
}

#[derive(Debug, Clone)]
pub struct ReservationStore {
    evse_id: EvseId,
    reservations: HashMap<ReservationId, Reservation>,
}

impl ReservationStore {
    pub fn new(evse_id: EvseId) -> Self {
        Self {
            evse_id,
            reservations: HashMap::new(),
        }
    }

    /// Create or renew a reservation.
    ///
    /// Location and admin-status checks belong to the caller; this only
    /// arbitrates between the request, the current operational status and the
    /// reservations already held.
    pub fn reserve(
        &mut self,
        request: &ReserveRequest,
        status: OperationalStatus,
        policy: &ReservePolicy,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, ReservationResult> {
        if let Some(duration) = request.duration {
            if duration <= Duration::zero() {
                return Err(ReservationResult::Error(
                    "Reservation duration must be positive".to_string(),
                ));
            }
        }

        // Update path
        if let Some(existing) = request
            .reservation_id
            .as_ref()
            .and_then(|id| self.reservations.get_mut(id))
        {
            let duration = request.duration.map(|d| d.min(policy.max_duration));
            existing.renew(now, duration);
            existing.provider_id = request.provider_id.clone();
            existing.auth_identity = request.auth_identity.clone();
            if request.product.is_some() {
                existing.product = request.product.clone();
            }
            if !request.allowed_tokens.is_empty() {
                existing.allowed_tokens = request.allowed_tokens.clone();
            }
            if !request.allowed_accounts.is_empty() {
                existing.allowed_accounts = request.allowed_accounts.clone();
            }
            if !request.pins.is_empty() {
                existing.pins = request.pins.clone();
            }
            debug!(evse_id = %self.evse_id, reservation_id = %existing.id, "Reservation renewed");
            return Ok(ReserveOutcome {
                reservation: existing.clone(),
                updated: true,
            });
        }

        // Create path
        match status {
            OperationalStatus::Available => {}
            OperationalStatus::Reserved => {
                if self.conflicts_with(request.level) {
                    return Err(ReservationResult::AlreadyReserved);
                }
            }
            OperationalStatus::Charging => {
                if !policy.allow_while_charging {
                    return Err(ReservationResult::Error(
                        "EVSE is charging and does not accept reservations".to_string(),
                    ));
                }
                if self.conflicts_with(request.level) {
                    return Err(ReservationResult::AlreadyReserved);
                }
            }
            OperationalStatus::OutOfService => return Err(ReservationResult::OutOfService),
            other => {
                return Err(ReservationResult::Error(format!(
                    "EVSE cannot be reserved while {}",
                    other
                )))
            }
        }

        let id = request
            .reservation_id
            .clone()
            .unwrap_or_else(ReservationId::generate);
        let mut reservation = Reservation::new(
            id,
            self.evse_id.clone(),
            request.provider_id.clone(),
            request.auth_identity.clone(),
            request.start_time.unwrap_or(now),
            policy.effective_duration(request.duration),
        );
        reservation.level = request.level;
        reservation.created_at = now;
        reservation.product = request.product.clone();
        reservation.allowed_tokens = request.allowed_tokens.clone();
        reservation.allowed_accounts = request.allowed_accounts.clone();
        reservation.pins = request.pins.clone();
        reservation.linked_reservation = request.linked_reservation_id.clone();

        self.reservations
            .insert(reservation.id.clone(), reservation.clone());
        Ok(ReserveOutcome {
            reservation,
            updated: false,
        })
    }

    /// A new reservation of `level` would collide with what is already held.
    pub fn conflicts_with(&self, level: ReservationLevel) -> bool {
        if self.reservations.is_empty() {
            return false;
        }
        level.is_exclusive() || self.reservations.values().any(|r| r.level.is_exclusive())
    }

    /// Insert or replace, used when mirroring a reservation created upstream.
    pub fn upsert(&mut self, reservation: Reservation) -> Option<Reservation> {
        self.reservations.insert(reservation.id.clone(), reservation)
    }

    pub fn remove(&mut self, id: &ReservationId) -> Option<Reservation> {
        self.reservations.remove(id)
    }

    /// Remove every reservation with `now >= end_time`.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<Reservation> {
        let expired: Vec<ReservationId> = self
            .reservations
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id.clone())
            .collect();

        let mut removed: Vec<Reservation> = expired
            .iter()
            .filter_map(|id| self.reservations.remove(id))
            .collect();
        removed.sort_by_key(|r| r.start_time);
        removed
    }

    /// Link a reservation to the session consuming it.
    pub fn consume(
        &mut self,
        id: &ReservationId,
        now: DateTime<Utc>,
        session_id: SessionId,
    ) -> Option<Reservation> {
        let reservation = self.reservations.get_mut(id)?;
        reservation.consume(now, session_id);
        Some(reservation.clone())
    }

    /// Detach a kept-alive reservation from its finished session.
    pub fn release(&mut self, id: &ReservationId) {
        if let Some(reservation) = self.reservations.get_mut(id) {
            reservation.session_id = None;
        }
    }

    pub fn get(&self, id: &ReservationId) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    pub fn contains(&self, id: &ReservationId) -> bool {
        self.reservations.contains_key(id)
    }

    /// Earliest-starting reservation; the one a remote start must match.
    pub fn earliest(&self) -> Option<&Reservation> {
        self.reservations
            .values()
            .min_by(|a, b| {
                a.start_time
                    .cmp(&b.start_time)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    /// All reservations ordered by start time.
    pub fn all(&self) -> Vec<Reservation> {
        let mut all: Vec<Reservation> = self.reservations.values().cloned().collect();
        all.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::AuthIdentity;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn store() -> ReservationStore {
        ReservationStore::new(EvseId::new("EVSE-1"))
    }

    fn request() -> ReserveRequest {
        ReserveRequest::new("PROV", "TAG-001")
    }

    #[test]
    fn create_from_available() {
        let mut s = store();
        let out = s
            .reserve(&request(), OperationalStatus::Available, &ReservePolicy::default(), t0())
            .unwrap();
        assert!(!out.updated);
        assert_eq!(out.reservation.evse_id, EvseId::new("EVSE-1"));
        assert_eq!(out.reservation.end_time(), t0() + Duration::minutes(15));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn duration_is_capped_at_max() {
        let mut s = store();
        let req = request().with_duration(Duration::hours(2));
        let out = s
            .reserve(&req, OperationalStatus::Available, &ReservePolicy::default(), t0())
            .unwrap();
        assert_eq!(out.reservation.duration, Duration::minutes(15));
    }

    #[test]
    fn non_positive_duration_is_an_error() {
        let mut s = store();
        let req = request().with_duration(Duration::zero());
        let res = s.reserve(&req, OperationalStatus::Available, &ReservePolicy::default(), t0());
        assert!(matches!(res, Err(ReservationResult::Error(_))));
        assert!(s.is_empty());
    }

    #[test]
    fn renew_same_id_keeps_id_and_extends_end() {
        let mut s = store();
        let policy = ReservePolicy::default();
        let first = s
            .reserve(&request().with_id("R1"), OperationalStatus::Available, &policy, t0())
            .unwrap();

        let later = t0() + Duration::minutes(5);
        let second = s
            .reserve(
                &request().with_id("R1").with_duration(Duration::minutes(15)),
                OperationalStatus::Reserved,
                &policy,
                later,
            )
            .unwrap();

        assert!(second.updated);
        assert_eq!(second.reservation.id, first.reservation.id);
        assert!(second.reservation.end_time() >= first.reservation.end_time());
        assert_eq!(second.reservation.consumed, Duration::minutes(5));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn exclusive_conflict_is_already_reserved() {
        let mut s = store();
        let policy = ReservePolicy::default();
        s.reserve(&request(), OperationalStatus::Available, &policy, t0())
            .unwrap();
        let res = s.reserve(
            &ReserveRequest::new("PROV", "TAG-002"),
            OperationalStatus::Reserved,
            &policy,
            t0(),
        );
        assert_eq!(res, Err(ReservationResult::AlreadyReserved));
    }

    #[test]
    fn station_level_reservations_coexist() {
        let mut s = store();
        let policy = ReservePolicy::default();
        let station = request().with_level(ReservationLevel::ChargingStation);
        s.reserve(&station, OperationalStatus::Available, &policy, t0())
            .unwrap();
        s.reserve(&station, OperationalStatus::Reserved, &policy, t0())
            .unwrap();
        assert_eq!(s.len(), 2);
        assert!(s.conflicts_with(ReservationLevel::Evse));
    }

    #[test]
    fn charging_requires_multi_reservation_policy() {
        let mut s = store();
        let res = s.reserve(&request(), OperationalStatus::Charging, &ReservePolicy::default(), t0());
        assert!(matches!(res, Err(ReservationResult::Error(_))));

        let policy = ReservePolicy {
            allow_while_charging: true,
            ..ReservePolicy::default()
        };
        assert!(s
            .reserve(&request(), OperationalStatus::Charging, &policy, t0())
            .is_ok());
    }

    #[test]
    fn hardware_states_are_rejected() {
        let mut s = store();
        let policy = ReservePolicy::default();
        assert_eq!(
            s.reserve(&request(), OperationalStatus::OutOfService, &policy, t0()),
            Err(ReservationResult::OutOfService)
        );
        assert!(matches!(
            s.reserve(&request(), OperationalStatus::Faulted, &policy, t0()),
            Err(ReservationResult::Error(_))
        ));
    }

    #[test]
    fn take_expired_removes_only_due_reservations() {
        let mut s = store();
        let policy = ReservePolicy::default();
        s.reserve(
            &request().with_id("SHORT").with_duration(Duration::seconds(1)),
            OperationalStatus::Available,
            &policy,
            t0(),
        )
        .unwrap();
        s.reserve(
            &request()
                .with_id("LONG")
                .with_level(ReservationLevel::ChargingStation)
                .with_duration(Duration::minutes(10)),
            OperationalStatus::Available,
            &policy,
            t0(),
        )
        .unwrap();

        assert!(s.take_expired(t0()).is_empty());
        let expired = s.take_expired(t0() + Duration::seconds(2));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, ReservationId::new("SHORT"));
        assert!(s.take_expired(t0() + Duration::seconds(2)).is_empty());
        assert!(s.contains(&ReservationId::new("LONG")));
    }

    #[test]
    fn earliest_and_consume() {
        let mut s = store();
        let policy = ReservePolicy::default();
        let station = ReservationLevel::ChargingStation;
        s.reserve(
            &request().with_id("B").with_level(station).starting_at(t0() + Duration::minutes(1)),
            OperationalStatus::Available,
            &policy,
            t0(),
        )
        .unwrap();
        s.reserve(
            &request().with_id("A").with_level(station),
            OperationalStatus::Reserved,
            &policy,
            t0(),
        )
        .unwrap();

        assert_eq!(s.earliest().unwrap().id, ReservationId::new("A"));
        let consumed = s
            .consume(&ReservationId::new("A"), t0() + Duration::minutes(2), SessionId::new("S1"))
            .unwrap();
        assert_eq!(consumed.session_id, Some(SessionId::new("S1")));
        s.release(&ReservationId::new("A"));
        assert!(s.get(&ReservationId::new("A")).unwrap().session_id.is_none());
        assert_eq!(s.all().len(), 2);
        assert!(s.get(&ReservationId::new("A")).unwrap().allows(&AuthIdentity::new("TAG-001")));
    }
}
