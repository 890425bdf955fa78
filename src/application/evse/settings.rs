//! Runtime settings of one EVSE

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::application::reservations::ReservePolicy;
use crate::config::{EvseConfig, MAX_RESERVATION_DURATION_SECS};
use crate::domain::ids::AuthIdentity;
use crate::domain::status_history::DEFAULT_HISTORY_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub struct EvseSettings {
    pub status_history_size: usize,
    pub max_reservation_duration: Duration,
    pub default_reservation_duration: Duration,
    pub expiry_check_interval: StdDuration,
    pub metering_interval: StdDuration,
    pub rated_power_kw: f64,
    pub allow_reservation_while_charging: bool,
    /// `Some` makes a virtual EVSE answer authorization itself
    pub local_auth_list: Option<HashSet<AuthIdentity>>,
}

impl Default for EvseSettings {
    fn default() -> Self {
        Self {
            status_history_size: DEFAULT_HISTORY_SIZE,
            max_reservation_duration: Duration::minutes(15),
            default_reservation_duration: Duration::minutes(15),
            expiry_check_interval: StdDuration::from_secs(60),
            metering_interval: StdDuration::from_secs(10),
            rated_power_kw: 22.0,
            allow_reservation_while_charging: false,
            local_auth_list: None,
        }
    }
}

impl EvseSettings {
    pub fn reserve_policy(&self) -> ReservePolicy {
        ReservePolicy {
            default_duration: self.default_reservation_duration,
            max_duration: self.max_reservation_duration,
            allow_while_charging: self.allow_reservation_while_charging,
        }
    }

    pub fn with_local_auth_list<I, T>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AuthIdentity>,
    {
        self.local_auth_list = Some(identities.into_iter().map(Into::into).collect());
        self
    }
}

impl From<&EvseConfig> for EvseSettings {
    fn from(config: &EvseConfig) -> Self {
        Self {
            status_history_size: config.status_history_size,
            max_reservation_duration: reservation_duration(config.max_reservation_duration_secs),
            default_reservation_duration: reservation_duration(
                config.default_reservation_duration_secs,
            ),
            expiry_check_interval: StdDuration::from_secs(config.expiry_check_interval_secs),
            metering_interval: StdDuration::from_secs(config.metering_interval_secs),
            rated_power_kw: config.rated_power_kw,
            allow_reservation_while_charging: config.allow_reservation_while_charging,
            local_auth_list: config
                .local_auth_list
                .as_ref()
                .map(|list| list.iter().map(|s| AuthIdentity::new(s.as_str())).collect()),
        }
    }
}

/// Seconds as a chrono duration, clamped to the configurable maximum.
fn reservation_duration(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_RESERVATION_DURATION_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let from_config = EvseSettings::from(&EvseConfig::default());
        assert_eq!(from_config, EvseSettings::default());
    }

    #[test]
    fn policy_carries_limits() {
        let settings = EvseSettings {
            max_reservation_duration: Duration::minutes(30),
            allow_reservation_while_charging: true,
            ..EvseSettings::default()
        };
        let policy = settings.reserve_policy();
        assert_eq!(policy.max_duration, Duration::minutes(30));
        assert!(policy.allow_while_charging);
    }

    #[test]
    fn oversized_durations_are_clamped() {
        let config = EvseConfig {
            max_reservation_duration_secs: 10_000_000_000_000_000,
            ..EvseConfig::default()
        };
        let settings = EvseSettings::from(&config);
        assert_eq!(
            settings.max_reservation_duration,
            Duration::seconds(MAX_RESERVATION_DURATION_SECS as i64)
        );
    }
}
