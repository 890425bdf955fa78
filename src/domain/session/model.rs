//! Charging session domain entity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AuthIdentity, EvseId, ProductId, ProviderId, ReservationId, SessionId};

/// Position of a meter sample within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterSampleKind {
    Start,
    Intermediate,
    Stop,
}

/// Energy register reading, in Wh since session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSample {
    pub kind: MeterSampleKind,
    pub timestamp: DateTime<Utc>,
    pub energy_wh: f64,
}

/// What happens to a consumed reservation when its session stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReservationHandling {
    /// Remove the reservation together with the session
    #[default]
    Close,
    /// Leave the reservation in place; the EVSE returns to Reserved
    KeepAlive,
}

/// The single active charging transaction of an EVSE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub id: SessionId,
    pub evse_id: EvseId,
    pub reservation_id: Option<ReservationId>,
    pub product: Option<ProductId>,
    pub provider_start: Option<ProviderId>,
    pub auth_start: Option<AuthIdentity>,
    pub provider_stop: Option<ProviderId>,
    pub auth_stop: Option<AuthIdentity>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub meter_samples: Vec<MeterSample>,
}

impl ChargingSession {
    /// New session with its Start sample at 0 Wh.
    pub fn start(id: SessionId, evse_id: EvseId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            evse_id,
            reservation_id: None,
            product: None,
            provider_start: None,
            auth_start: None,
            provider_stop: None,
            auth_stop: None,
            started_at,
            stopped_at: None,
            meter_samples: vec![MeterSample {
                kind: MeterSampleKind::Start,
                timestamp: started_at,
                energy_wh: 0.0,
            }],
        }
    }

    pub fn is_active(&self) -> bool {
        self.stopped_at.is_none()
    }

    pub fn last_sample(&self) -> Option<&MeterSample> {
        self.meter_samples.last()
    }

    /// Append a sample, keeping time and energy non-decreasing.
    ///
    /// Returns `false` (and records nothing) if the session already stopped or
    /// the sample would go back in time.
    pub fn record_sample(
        &mut self,
        kind: MeterSampleKind,
        timestamp: DateTime<Utc>,
        energy_wh: f64,
    ) -> bool {
        if !self.is_active() {
            return false;
        }
        let (last_ts, last_wh) = self
            .last_sample()
            .map(|s| (s.timestamp, s.energy_wh))
            .unwrap_or((self.started_at, 0.0));
        if timestamp < last_ts {
            return false;
        }
        self.meter_samples.push(MeterSample {
            kind,
            timestamp,
            energy_wh: energy_wh.max(last_wh),
        });
        true
    }

    pub fn energy_wh(&self) -> f64 {
        let first = self.meter_samples.first().map(|s| s.energy_wh).unwrap_or(0.0);
        let last = self.last_sample().map(|s| s.energy_wh).unwrap_or(0.0);
        last - first
    }

    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.stopped_at.unwrap_or(now) - self.started_at
    }
}

/// Terminal record of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeDetailRecord {
    pub session_id: SessionId,
    pub evse_id: EvseId,
    pub reservation_id: Option<ReservationId>,
    pub product: Option<ProductId>,
    pub provider_start: Option<ProviderId>,
    pub auth_start: Option<AuthIdentity>,
    pub provider_stop: Option<ProviderId>,
    pub auth_stop: Option<AuthIdentity>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    #[serde(with = "crate::shared::serde_duration")]
    pub duration: Duration,
    pub energy_wh: f64,
    pub meter_samples: Vec<MeterSample>,
    pub stop_reason: Option<String>,
}

impl ChargeDetailRecord {
    /// Build the record of a session that has its Stop sample and end time set.
    pub fn from_session(session: &ChargingSession, stop_reason: Option<String>) -> Self {
        let stopped_at = session.stopped_at.unwrap_or(session.started_at);
        Self {
            session_id: session.id.clone(),
            evse_id: session.evse_id.clone(),
            reservation_id: session.reservation_id.clone(),
            product: session.product.clone(),
            provider_start: session.provider_start.clone(),
            auth_start: session.auth_start.clone(),
            provider_stop: session.provider_stop.clone(),
            auth_stop: session.auth_stop.clone(),
            started_at: session.started_at,
            stopped_at,
            duration: stopped_at - session.started_at,
            energy_wh: session.energy_wh(),
            meter_samples: session.meter_samples.clone(),
            stop_reason,
        }
    }
}

/// Energy a constant `power_kw` delivers over `elapsed`, in Wh.
pub fn estimate_energy_wh(power_kw: f64, elapsed: Duration) -> f64 {
    let hours = elapsed.num_milliseconds().max(0) as f64 / 3_600_000.0;
    power_kw * 1000.0 * hours
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn sample_session() -> ChargingSession {
        ChargingSession::start(SessionId::new("S1"), EvseId::new("EVSE-1"), t0())
    }

    #[test]
    fn new_session_has_start_sample_at_zero() {
        let s = sample_session();
        assert!(s.is_active());
        assert_eq!(s.meter_samples.len(), 1);
        assert_eq!(s.meter_samples[0].kind, MeterSampleKind::Start);
        assert_eq!(s.meter_samples[0].energy_wh, 0.0);
    }

    #[test]
    fn samples_are_monotonic() {
        let mut s = sample_session();
        assert!(s.record_sample(MeterSampleKind::Intermediate, t0() + Duration::seconds(10), 50.0));
        assert!(!s.record_sample(MeterSampleKind::Intermediate, t0() + Duration::seconds(5), 60.0));
        // Energy never decreases even if a lower reading arrives
        assert!(s.record_sample(MeterSampleKind::Intermediate, t0() + Duration::seconds(20), 40.0));
        assert_eq!(s.last_sample().unwrap().energy_wh, 50.0);
    }

    #[test]
    fn stopped_session_rejects_samples() {
        let mut s = sample_session();
        s.stopped_at = Some(t0() + Duration::seconds(1));
        assert!(!s.record_sample(MeterSampleKind::Stop, t0() + Duration::seconds(2), 1.0));
    }

    #[test]
    fn estimate_energy_for_one_hour_at_22kw() {
        assert_eq!(estimate_energy_wh(22.0, Duration::hours(1)), 22_000.0);
        assert_eq!(estimate_energy_wh(11.0, Duration::minutes(30)), 5_500.0);
        assert_eq!(estimate_energy_wh(11.0, Duration::seconds(-5)), 0.0);
    }

    #[test]
    fn cdr_copies_session_data() {
        let mut s = sample_session();
        s.record_sample(MeterSampleKind::Stop, t0() + Duration::minutes(30), 5_500.0);
        s.stopped_at = Some(t0() + Duration::minutes(30));
        let cdr = ChargeDetailRecord::from_session(&s, Some("Remote".into()));
        assert_eq!(cdr.energy_wh, 5_500.0);
        assert_eq!(cdr.duration, Duration::minutes(30));
        assert_eq!(cdr.meter_samples.len(), 2);
        assert_eq!(cdr.stop_reason.as_deref(), Some("Remote"));
    }
}
