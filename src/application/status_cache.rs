//! Status cache fed by EVSE notifications
//!
//! Keeps the latest admin and operational status per EVSE, the way a roaming
//! adapter mirrors the network view. Register it as a sink on one or more
//! event buses; it never queries an EVSE directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::application::events::{EventSink, SinkError};
use crate::domain::events::{Event, EventMessage};
use crate::domain::ids::EvseId;
use crate::domain::status::{AdminStatus, OperationalStatus};

/// Last known status of one EVSE
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedStatus {
    pub admin: Option<AdminStatus>,
    pub admin_at: Option<DateTime<Utc>>,
    pub operational: Option<OperationalStatus>,
    pub operational_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct EvseStatusCache {
    entries: DashMap<EvseId, CachedStatus>,
}

impl EvseStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get(&self, evse_id: &EvseId) -> Option<CachedStatus> {
        self.entries.get(evse_id).map(|entry| entry.value().clone())
    }

    pub fn operational_status(&self, evse_id: &EvseId) -> Option<OperationalStatus> {
        self.entries.get(evse_id).and_then(|entry| entry.operational)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply a status event. Entries older than what is cached for the same
    /// status stream are ignored.
    pub fn apply(&self, event: &Event) {
        match event {
            Event::AdminStatusChanged(e) => {
                let mut entry = self.entry(&e.evse_id);
                let status = entry.value_mut();
                if is_stale(status.admin_at, e.new.timestamp) {
                    debug!(evse_id = %e.evse_id, "Stale admin status notification ignored");
                    return;
                }
                status.admin = Some(e.new.value);
                status.admin_at = Some(e.new.timestamp);
            }
            Event::OperationalStatusChanged(e) => {
                let mut entry = self.entry(&e.evse_id);
                let status = entry.value_mut();
                if is_stale(status.operational_at, e.new.timestamp) {
                    debug!(evse_id = %e.evse_id, "Stale operational status notification ignored");
                    return;
                }
                status.operational = Some(e.new.value);
                status.operational_at = Some(e.new.timestamp);
            }
            _ => {}
        }
    }

    fn entry(&self, evse_id: &EvseId) -> RefMut<'_, EvseId, CachedStatus> {
        self.entries.entry(evse_id.clone()).or_insert_with(|| CachedStatus {
            admin: None,
            admin_at: None,
            operational: None,
            operational_at: None,
        })
    }
}

fn is_stale(cached_at: Option<DateTime<Utc>>, at: DateTime<Utc>) -> bool {
    cached_at.is_some_and(|cached| at < cached)
}

impl EventSink for EvseStatusCache {
    fn name(&self) -> &str {
        "status-cache"
    }

    fn deliver(&self, message: &EventMessage) -> Result<(), SinkError> {
        self.apply(&message.event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evse::EvseBuilder;
    use crate::domain::commands::{CommandOptions, RemoteStartRequest};
    use crate::domain::events::OperationalStatusChangedEvent;
    use crate::domain::status_history::StatusEntry;
    use crate::shared::{Clock, ManualClock};
    use chrono::Duration;

    #[tokio::test]
    async fn follows_evse_status_changes() {
        let cache = EvseStatusCache::shared();
        let evse = EvseBuilder::new("EVSE-1").build();
        evse.event_bus().add_sink(cache.clone());

        evse.remote_start(RemoteStartRequest::new(), CommandOptions::default())
            .await;
        assert_eq!(
            cache.operational_status(&EvseId::new("EVSE-1")),
            Some(OperationalStatus::Charging)
        );

        evse.set_admin_status(AdminStatus::Planned, Some(Utc::now()), None);
        let cached = cache.get(&EvseId::new("EVSE-1")).unwrap();
        assert_eq!(cached.admin, Some(AdminStatus::Planned));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ignores_older_entries() {
        let cache = EvseStatusCache::new();
        let evse_id = EvseId::new("EVSE-1");
        let now = Utc::now();
        let change = |at: DateTime<Utc>, value: OperationalStatus| {
            Event::OperationalStatusChanged(OperationalStatusChangedEvent {
                evse_id: evse_id.clone(),
                old: StatusEntry::new(OperationalStatus::Available, at, None),
                new: StatusEntry::new(value, at, None),
            })
        };

        cache.apply(&change(now, OperationalStatus::Charging));
        cache.apply(&change(now - Duration::seconds(5), OperationalStatus::Reserved));

        assert_eq!(cache.operational_status(&evse_id), Some(OperationalStatus::Charging));
    }

    #[tokio::test]
    async fn admin_and_operational_streams_age_independently() {
        let clock = ManualClock::starting_now();
        let t0 = clock.now();
        let cache = EvseStatusCache::shared();
        let evse = EvseBuilder::new("EVSE-1").with_clock(clock.clone()).build();
        evse.event_bus().add_sink(cache.clone());

        clock.advance(Duration::seconds(10));
        evse.remote_start(RemoteStartRequest::new(), CommandOptions::default())
            .await;
        evse.set_admin_status(AdminStatus::OutOfService, Some(t0 + Duration::seconds(5)), None);

        assert_eq!(evse.admin_status(), AdminStatus::OutOfService);
        let cached = cache.get(&EvseId::new("EVSE-1")).unwrap();
        assert_eq!(cached.admin, Some(AdminStatus::OutOfService));
        assert_eq!(cached.admin_at, Some(t0 + Duration::seconds(5)));
        assert_eq!(cached.operational, Some(OperationalStatus::Charging));
        assert_eq!(cached.operational_at, Some(t0 + Duration::seconds(10)));
    }
}
