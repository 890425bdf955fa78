//! Remote controller port
//!
//! [`RemoteController`] is the contract every collaborator able to execute
//! EVSE commands implements: a hardware controller attached to the EVSE, or
//! the station, pool, operator or roaming provider above it. The EVSE never
//! knows which concrete transport sits behind it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::commands::{
    AuthStartResult, AuthStopResult, AuthorizeStartRequest, AuthorizeStopRequest,
    CancelReservationRequest, CancelReservationResult, RemoteStartRequest, RemoteStartResult,
    RemoteStopRequest, RemoteStopResult, ReservationResult, ReserveRequest,
};
use crate::domain::error::ControllerResult;
use crate::domain::ids::EvseId;

/// Port for executing EVSE commands somewhere else.
///
/// A returned `Err` is an unexpected failure (transport down, garbage
/// response); expected refusals are result variants inside `Ok`.
#[async_trait]
pub trait RemoteController: Send + Sync {
    /// Identifier used in logs and as the status source
    fn id(&self) -> &str;

    async fn reserve(
        &self,
        evse_id: &EvseId,
        request: &ReserveRequest,
    ) -> ControllerResult<ReservationResult>;

    async fn cancel_reservation(
        &self,
        evse_id: &EvseId,
        request: &CancelReservationRequest,
    ) -> ControllerResult<CancelReservationResult>;

    async fn remote_start(
        &self,
        evse_id: &EvseId,
        request: &RemoteStartRequest,
    ) -> ControllerResult<RemoteStartResult>;

    async fn remote_stop(
        &self,
        evse_id: &EvseId,
        request: &RemoteStopRequest,
    ) -> ControllerResult<RemoteStopResult>;

    async fn authorize_start(
        &self,
        evse_id: &EvseId,
        request: &AuthorizeStartRequest,
    ) -> ControllerResult<AuthStartResult>;

    async fn authorize_stop(
        &self,
        evse_id: &EvseId,
        request: &AuthorizeStopRequest,
    ) -> ControllerResult<AuthStopResult>;
}

/// Shared, reference-counted controller
pub type SharedController = Arc<dyn RemoteController>;
