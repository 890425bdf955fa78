//! Charging infrastructure above the EVSE
//!
//! Station → pool → operator → roaming provider. Each level may carry a
//! controller; an EVSE that cannot execute a command itself walks this chain
//! upwards and hands the command to the first controller it finds.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::application::commands::{FallbackChain, SharedController};
use crate::application::evse::Evse;
use crate::domain::commands::HopLevel;
use crate::domain::ids::{EvseId, OperatorId, PoolId, StationId};
use crate::domain::status::OperationalStatus;

/// Charging station operator (CSO) and its roaming connection
pub struct ChargingStationOperator {
    id: OperatorId,
    controller: Option<SharedController>,
    roaming_provider: Option<SharedController>,
}

impl ChargingStationOperator {
    pub fn new(id: impl Into<OperatorId>) -> Self {
        Self {
            id: id.into(),
            controller: None,
            roaming_provider: None,
        }
    }

    pub fn with_controller(mut self, controller: SharedController) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_roaming_provider(mut self, provider: SharedController) -> Self {
        self.roaming_provider = Some(provider);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn id(&self) -> &OperatorId {
        &self.id
    }

    pub(crate) fn extend_chain(&self, chain: &mut FallbackChain) {
        chain
            .push_remote(HopLevel::Operator, self.controller.clone())
            .push_remote(HopLevel::RoamingProvider, self.roaming_provider.clone());
    }
}

/// Group of stations at one site
pub struct ChargingPool {
    id: PoolId,
    controller: Option<SharedController>,
    operator: Option<Arc<ChargingStationOperator>>,
}

impl ChargingPool {
    pub fn new(id: impl Into<PoolId>) -> Self {
        Self {
            id: id.into(),
            controller: None,
            operator: None,
        }
    }

    pub fn with_controller(mut self, controller: SharedController) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_operator(mut self, operator: Arc<ChargingStationOperator>) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    pub fn operator(&self) -> Option<&Arc<ChargingStationOperator>> {
        self.operator.as_ref()
    }

    pub(crate) fn extend_chain(&self, chain: &mut FallbackChain) {
        chain.push_remote(HopLevel::ChargingPool, self.controller.clone());
        if let Some(operator) = &self.operator {
            operator.extend_chain(chain);
        }
    }
}

/// Charging station owning a set of EVSEs
pub struct ChargingStation {
    id: StationId,
    controller: Option<SharedController>,
    pool: Option<Arc<ChargingPool>>,
    evses: DashMap<EvseId, Evse>,
}

impl ChargingStation {
    pub fn new(id: impl Into<StationId>) -> Self {
        Self {
            id: id.into(),
            controller: None,
            pool: None,
            evses: DashMap::new(),
        }
    }

    pub fn with_controller(mut self, controller: SharedController) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_pool(mut self, pool: Arc<ChargingPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Wrap in `Arc`; EVSEs can only be attached to a shared station.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn id(&self) -> &StationId {
        &self.id
    }

    pub fn pool(&self) -> Option<&Arc<ChargingPool>> {
        self.pool.as_ref()
    }

    /// Attach `evse`; it keeps a weak reference back to this station.
    pub fn add_evse(self: &Arc<Self>, evse: Evse) {
        if let Some(previous) = evse.station() {
            if !Arc::ptr_eq(&previous, self) {
                warn!(evse_id = %evse.id(), from = %previous.id(), to = %self.id, "Moving EVSE to another station");
                previous.evses.remove(evse.id());
            }
        }
        evse.attach_station(Arc::downgrade(self));
        info!(station_id = %self.id, evse_id = %evse.id(), "EVSE attached to station");
        self.evses.insert(evse.id().clone(), evse);
    }

    pub fn remove_evse(&self, evse_id: &EvseId) -> Option<Evse> {
        let (_, evse) = self.evses.remove(evse_id)?;
        evse.detach_station();
        info!(station_id = %self.id, %evse_id, "EVSE detached from station");
        Some(evse)
    }

    pub fn evse(&self, evse_id: &EvseId) -> Option<Evse> {
        self.evses.get(evse_id).map(|entry| entry.value().clone())
    }

    pub fn evse_ids(&self) -> Vec<EvseId> {
        let mut ids: Vec<EvseId> = self.evses.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn evse_count(&self) -> usize {
        self.evses.len()
    }

    /// Number of EVSEs per current operational status
    pub fn status_counts(&self) -> HashMap<OperationalStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.evses.iter() {
            *counts.entry(entry.value().operational_status()).or_insert(0) += 1;
        }
        counts
    }

    pub(crate) fn extend_chain(&self, chain: &mut FallbackChain) {
        chain.push_remote(HopLevel::ChargingStation, self.controller.clone());
        if let Some(pool) = &self.pool {
            pool.extend_chain(chain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evse::EvseBuilder;

    #[tokio::test]
    async fn add_and_remove_evses() {
        let station = ChargingStation::new("ST-1").shared();
        let evse = EvseBuilder::new("EVSE-1").build();
        station.add_evse(evse.clone());
        station.add_evse(EvseBuilder::new("EVSE-2").build());

        assert_eq!(station.evse_count(), 2);
        assert_eq!(evse.station().unwrap().id(), &StationId::new("ST-1"));
        assert_eq!(station.status_counts().get(&OperationalStatus::Available), Some(&2));

        let removed = station.remove_evse(&EvseId::new("EVSE-1")).unwrap();
        assert!(removed.station().is_none());
        assert_eq!(station.evse_ids(), vec![EvseId::new("EVSE-2")]);
    }

    #[tokio::test]
    async fn evse_back_reference_is_weak() {
        let evse = EvseBuilder::new("EVSE-1").build();
        {
            let station = ChargingStation::new("ST-1").shared();
            station.add_evse(evse.clone());
            assert!(evse.station().is_some());
        }
        assert!(evse.station().is_none());
    }

    #[tokio::test]
    async fn moving_an_evse_detaches_it_from_the_old_station() {
        let a = ChargingStation::new("A").shared();
        let b = ChargingStation::new("B").shared();
        let evse = EvseBuilder::new("EVSE-1").build();
        a.add_evse(evse.clone());
        b.add_evse(evse.clone());
        assert_eq!(a.evse_count(), 0);
        assert_eq!(b.evse_count(), 1);
        assert_eq!(evse.station().unwrap().id(), &StationId::new("B"));
    }
}
