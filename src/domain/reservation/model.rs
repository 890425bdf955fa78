//! Reservation domain entity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AuthIdentity, EvseId, ProductId, ProviderId, ReservationId, SessionId};

/// Scope a reservation claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReservationLevel {
    /// Exclusive claim on one EVSE
    #[default]
    Evse,
    /// Any EVSE of the station; several may coexist on one EVSE
    ChargingStation,
    /// Any EVSE of the pool; several may coexist on one EVSE
    ChargingPool,
}

impl ReservationLevel {
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Evse)
    }
}

/// Why a reservation left the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReservationReason {
    /// Explicit CancelReservation call
    Deleted,
    /// Removed by the expiry sweep
    Expired,
    /// The reserved session finished and the reservation was closed with it
    Consumed,
    /// Superseded by a delegated cancellation result
    Aborted,
}

impl CancelReservationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "Deleted",
            Self::Expired => "Expired",
            Self::Consumed => "Consumed",
            Self::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for CancelReservationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-boxed claim on an EVSE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub evse_id: EvseId,
    pub level: ReservationLevel,
    /// Start of the current window (reset on renewal)
    pub start_time: DateTime<Utc>,
    #[serde(with = "crate::shared::serde_duration")]
    pub duration: Duration,
    /// Time of earlier windows already used up, accumulated across renewals
    #[serde(with = "crate::shared::serde_duration")]
    pub consumed: Duration,
    pub provider_id: ProviderId,
    pub auth_identity: AuthIdentity,
    pub product: Option<ProductId>,
    pub allowed_tokens: Vec<AuthIdentity>,
    pub allowed_accounts: Vec<String>,
    pub pins: Vec<String>,
    pub linked_reservation: Option<ReservationId>,
    /// Session that consumed this reservation
    pub session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        id: ReservationId,
        evse_id: EvseId,
        provider_id: ProviderId,
        auth_identity: AuthIdentity,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id,
            evse_id,
            level: ReservationLevel::Evse,
            start_time,
            duration,
            consumed: Duration::zero(),
            provider_id,
            auth_identity,
            product: None,
            allowed_tokens: Vec::new(),
            allowed_accounts: Vec::new(),
            pins: Vec::new(),
            linked_reservation: None,
            session_id: None,
            created_at: start_time,
        }
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + self.duration
    }

    /// `now >= end_time`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time()
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time() - now).max(Duration::zero())
    }

    /// Renew in place: the new window starts at `now`, the elapsed part of the
    /// old window is added to `consumed`.
    ///
    /// Without a new `duration` the previous end time is kept.
    pub fn renew(&mut self, now: DateTime<Utc>, duration: Option<Duration>) {
        let previous_end = self.end_time();
        let elapsed = (now - self.start_time).max(Duration::zero());
        self.consumed += elapsed;
        self.start_time = now;
        self.duration = match duration {
            Some(d) => d,
            None => (previous_end - now).max(Duration::zero()),
        };
    }

    /// Account the time used up to `now` when a session consumes the reservation.
    pub fn consume(&mut self, now: DateTime<Utc>, session_id: SessionId) {
        let elapsed = (now - self.start_time).max(Duration::zero());
        self.consumed += elapsed;
        self.session_id = Some(session_id);
    }

    /// Whether `identity` may use this reservation: the reserving identity
    /// itself or any entry of the token/account/PIN allow-lists.
    pub fn allows(&self, identity: &AuthIdentity) -> bool {
        *identity == self.auth_identity
            || self.allowed_tokens.contains(identity)
            || self.allowed_accounts.iter().any(|a| a == identity.as_str())
            || self.pins.iter().any(|p| p == identity.as_str())
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn sample_reservation() -> Reservation {
        Reservation::new(
            ReservationId::new("R1"),
            EvseId::new("EVSE-1"),
            ProviderId::new("PROV"),
            AuthIdentity::new("TAG-001"),
            t0(),
            Duration::minutes(15),
        )
    }

    #[test]
    fn end_time_is_start_plus_duration() {
        let r = sample_reservation();
        assert_eq!(r.end_time(), t0() + Duration::minutes(15));
        assert_eq!(r.level, ReservationLevel::Evse);
        assert!(r.session_id.is_none());
    }

    #[test]
    fn expired_exactly_at_end_time() {
        let r = sample_reservation();
        assert!(!r.is_expired(t0() + Duration::minutes(15) - Duration::seconds(1)));
        assert!(r.is_expired(t0() + Duration::minutes(15)));
        assert_eq!(r.remaining(t0() + Duration::minutes(20)), Duration::zero());
    }

    #[test]
    fn renew_with_duration_accumulates_consumed() {
        let mut r = sample_reservation();
        let now = t0() + Duration::minutes(5);
        r.renew(now, Some(Duration::minutes(15)));
        assert_eq!(r.consumed, Duration::minutes(5));
        assert_eq!(r.start_time, now);
        assert_eq!(r.end_time(), now + Duration::minutes(15));
    }

    #[test]
    fn renew_without_duration_keeps_end_time() {
        let mut r = sample_reservation();
        let end = r.end_time();
        r.renew(t0() + Duration::minutes(10), None);
        assert_eq!(r.end_time(), end);
        assert_eq!(r.consumed, Duration::minutes(10));
    }

    #[test]
    fn allow_lists() {
        let mut r = sample_reservation();
        r.allowed_tokens.push(AuthIdentity::new("TAG-002"));
        r.allowed_accounts.push("ACCOUNT-9".into());
        r.pins.push("1234".into());

        assert!(r.allows(&AuthIdentity::new("TAG-001")));
        assert!(r.allows(&AuthIdentity::new("TAG-002")));
        assert!(r.allows(&AuthIdentity::new("ACCOUNT-9")));
        assert!(r.allows(&AuthIdentity::new("1234")));
        assert!(!r.allows(&AuthIdentity::new("STRANGER")));
    }

    #[test]
    fn consume_links_session() {
        let mut r = sample_reservation();
        r.consume(t0() + Duration::minutes(3), SessionId::new("S1"));
        assert_eq!(r.consumed, Duration::minutes(3));
        assert_eq!(r.session_id, Some(SessionId::new("S1")));
    }

    #[test]
    fn exclusive_levels() {
        assert!(ReservationLevel::Evse.is_exclusive());
        assert!(!ReservationLevel::ChargingStation.is_exclusive());
    }
}
