//! Command requests and results
//!
//! Every externally visible EVSE operation takes one of the request types
//! below and answers with a result enum. Results are values, never errors:
//! an unexpected failure anywhere along the way becomes an `Error(message)`
//! variant, and the wrapping [`CommandResponse`] carries the elapsed runtime
//! and the hierarchy level that actually executed the command.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AuthIdentity, EvseId, ProductId, ProviderId, ReservationId, SessionId};
use super::reservation::{CancelReservationReason, Reservation, ReservationLevel};
use super::session::{ChargeDetailRecord, ChargingSession, ReservationHandling};
use crate::shared::CancellationSignal;

// ── Command metadata ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Reserve,
    CancelReservation,
    AuthorizeStart,
    AuthorizeStop,
    RemoteStart,
    RemoteStop,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::CancelReservation => "cancel_reservation",
            Self::AuthorizeStart => "authorize_start",
            Self::AuthorizeStop => "authorize_stop",
            Self::RemoteStart => "remote_start",
            Self::RemoteStop => "remote_stop",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level of the hierarchy that answered a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HopLevel {
    /// The EVSE's own simulation engine
    Local,
    /// Hardware controller attached directly to the EVSE
    EvseController,
    ChargingStation,
    ChargingPool,
    Operator,
    RoamingProvider,
}

impl HopLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::EvseController => "evse_controller",
            Self::ChargingStation => "charging_station",
            Self::ChargingPool => "charging_pool",
            Self::Operator => "operator",
            Self::RoamingProvider => "roaming_provider",
        }
    }
}

impl std::fmt::Display for HopLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call cancellation and timeout
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub timeout: Option<StdDuration>,
    pub cancel: Option<CancellationSignal>,
}

impl CommandOptions {
    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Result envelope returned by every EVSE operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse<R> {
    pub result: R,
    pub runtime: StdDuration,
    /// `None` when the command was answered by a local precondition check
    pub executed_by: Option<HopLevel>,
}

/// Behaviour shared by all result enums, used by the generic dispatch path.
pub trait CommandResult: Clone + std::fmt::Debug + Send + 'static {
    fn error(message: impl Into<String>) -> Self;
    fn offline() -> Self;
    fn is_success(&self) -> bool;
    /// Short label used for logs and metrics
    fn label(&self) -> &'static str;
}

macro_rules! impl_command_result {
    ($ty:ident { success: $success:pat, labels: { $($pat:pat => $label:literal),* $(,)? } }) => {
        impl CommandResult for $ty {
            fn error(message: impl Into<String>) -> Self {
                Self::Error(message.into())
            }

            fn offline() -> Self {
                Self::Offline
            }

            fn is_success(&self) -> bool {
                matches!(self, $success)
            }

            fn label(&self) -> &'static str {
                match self {
                    $($pat => $label,)*
                }
            }
        }
    };
}

// ── Reserve ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Target EVSE; `None` means "this EVSE"
    pub location: Option<EvseId>,
    pub level: ReservationLevel,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_duration")]
    pub duration: Option<Duration>,
    /// Existing id renews that reservation; `None` generates a new id
    pub reservation_id: Option<ReservationId>,
    pub linked_reservation_id: Option<ReservationId>,
    pub provider_id: ProviderId,
    pub auth_identity: AuthIdentity,
    pub product: Option<ProductId>,
    pub allowed_tokens: Vec<AuthIdentity>,
    pub allowed_accounts: Vec<String>,
    pub pins: Vec<String>,
}

impl ReserveRequest {
    pub fn new(provider_id: impl Into<ProviderId>, auth_identity: impl Into<AuthIdentity>) -> Self {
        Self {
            location: None,
            level: ReservationLevel::Evse,
            start_time: None,
            duration: None,
            reservation_id: None,
            linked_reservation_id: None,
            provider_id: provider_id.into(),
            auth_identity: auth_identity.into(),
            product: None,
            allowed_tokens: Vec::new(),
            allowed_accounts: Vec::new(),
            pins: Vec::new(),
        }
    }

    pub fn at(mut self, evse_id: impl Into<EvseId>) -> Self {
        self.location = Some(evse_id.into());
        self
    }

    pub fn with_level(mut self, level: ReservationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_id(mut self, id: impl Into<ReservationId>) -> Self {
        self.reservation_id = Some(id.into());
        self
    }

    pub fn linked_to(mut self, id: impl Into<ReservationId>) -> Self {
        self.linked_reservation_id = Some(id.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<ProductId>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn allow_token(mut self, token: impl Into<AuthIdentity>) -> Self {
        self.allowed_tokens.push(token.into());
        self
    }

    pub fn allow_account(mut self, account: impl Into<String>) -> Self {
        self.allowed_accounts.push(account.into());
        self
    }

    pub fn allow_pin(mut self, pin: impl Into<String>) -> Self {
        self.pins.push(pin.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReservationResult {
    Success(Reservation),
    UnknownLocation,
    OutOfService,
    Offline,
    /// An exclusive reservation already holds the EVSE
    AlreadyReserved,
    Error(String),
}

impl_command_result!(ReservationResult {
    success: ReservationResult::Success(_),
    labels: {
        Self::Success(_) => "success",
        Self::UnknownLocation => "unknown_location",
        Self::OutOfService => "out_of_service",
        Self::Offline => "offline",
        Self::AlreadyReserved => "already_reserved",
        Self::Error(_) => "error",
    }
});

// ── CancelReservation ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelReservationRequest {
    pub reservation_id: ReservationId,
    pub reason: CancelReservationReason,
    pub provider_id: Option<ProviderId>,
}

impl CancelReservationRequest {
    pub fn new(reservation_id: impl Into<ReservationId>) -> Self {
        Self {
            reservation_id: reservation_id.into(),
            reason: CancelReservationReason::Deleted,
            provider_id: None,
        }
    }

    pub fn with_reason(mut self, reason: CancelReservationReason) -> Self {
        self.reason = reason;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CancelReservationResult {
    /// The removed reservation
    Success(Reservation),
    UnknownReservationId,
    UnknownLocation,
    OutOfService,
    Offline,
    Error(String),
}

impl_command_result!(CancelReservationResult {
    success: CancelReservationResult::Success(_),
    labels: {
        Self::Success(_) => "success",
        Self::UnknownReservationId => "unknown_reservation_id",
        Self::UnknownLocation => "unknown_location",
        Self::OutOfService => "out_of_service",
        Self::Offline => "offline",
        Self::Error(_) => "error",
    }
});

// ── RemoteStart ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStartRequest {
    pub location: Option<EvseId>,
    /// Externally supplied session id; generated when `None`
    pub session_id: Option<SessionId>,
    pub reservation_id: Option<ReservationId>,
    pub product: Option<ProductId>,
    pub provider_id: Option<ProviderId>,
    pub auth_identity: Option<AuthIdentity>,
}

impl RemoteStartRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, evse_id: impl Into<EvseId>) -> Self {
        self.location = Some(evse_id.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_reservation(mut self, id: impl Into<ReservationId>) -> Self {
        self.reservation_id = Some(id.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<ProductId>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn by(mut self, provider: impl Into<ProviderId>, identity: impl Into<AuthIdentity>) -> Self {
        self.provider_id = Some(provider.into());
        self.auth_identity = Some(identity.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStartResult {
    Success(ChargingSession),
    UnknownLocation,
    OutOfService,
    Offline,
    AlreadyInUse,
    /// Reserved for someone else, or the reservation id did not match
    Reserved,
    InvalidCredentials,
    Error(String),
}

impl_command_result!(RemoteStartResult {
    success: RemoteStartResult::Success(_),
    labels: {
        Self::Success(_) => "success",
        Self::UnknownLocation => "unknown_location",
        Self::OutOfService => "out_of_service",
        Self::Offline => "offline",
        Self::AlreadyInUse => "already_in_use",
        Self::Reserved => "reserved",
        Self::InvalidCredentials => "invalid_credentials",
        Self::Error(_) => "error",
    }
});

// ── RemoteStop ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStopRequest {
    pub location: Option<EvseId>,
    pub session_id: SessionId,
    pub reservation_handling: ReservationHandling,
    pub provider_id: Option<ProviderId>,
    pub auth_identity: Option<AuthIdentity>,
}

impl RemoteStopRequest {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            location: None,
            session_id: session_id.into(),
            reservation_handling: ReservationHandling::Close,
            provider_id: None,
            auth_identity: None,
        }
    }

    pub fn at(mut self, evse_id: impl Into<EvseId>) -> Self {
        self.location = Some(evse_id.into());
        self
    }

    pub fn keep_reservation_alive(mut self) -> Self {
        self.reservation_handling = ReservationHandling::KeepAlive;
        self
    }

    pub fn by(mut self, provider: impl Into<ProviderId>, identity: impl Into<AuthIdentity>) -> Self {
        self.provider_id = Some(provider.into());
        self.auth_identity = Some(identity.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStopResult {
    Success(ChargeDetailRecord),
    UnknownLocation,
    InvalidSessionId,
    Offline,
    Error(String),
}

impl_command_result!(RemoteStopResult {
    success: RemoteStopResult::Success(_),
    labels: {
        Self::Success(_) => "success",
        Self::UnknownLocation => "unknown_location",
        Self::InvalidSessionId => "invalid_session_id",
        Self::Offline => "offline",
        Self::Error(_) => "error",
    }
});

// ── AuthorizeStart / AuthorizeStop ─────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeStartRequest {
    pub location: Option<EvseId>,
    pub auth_identity: AuthIdentity,
    pub product: Option<ProductId>,
    pub session_id: Option<SessionId>,
}

impl AuthorizeStartRequest {
    pub fn new(auth_identity: impl Into<AuthIdentity>) -> Self {
        Self {
            location: None,
            auth_identity: auth_identity.into(),
            product: None,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuthStartResult {
    Authorized {
        provider_id: Option<ProviderId>,
        /// Session id the authorizer wants the following start to use
        session_id: Option<SessionId>,
    },
    NotAuthorized,
    UnknownLocation,
    OutOfService,
    Offline,
    Error(String),
}

impl_command_result!(AuthStartResult {
    success: AuthStartResult::Authorized { .. },
    labels: {
        Self::Authorized { .. } => "authorized",
        Self::NotAuthorized => "not_authorized",
        Self::UnknownLocation => "unknown_location",
        Self::OutOfService => "out_of_service",
        Self::Offline => "offline",
        Self::Error(_) => "error",
    }
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeStopRequest {
    pub location: Option<EvseId>,
    pub session_id: SessionId,
    pub auth_identity: AuthIdentity,
}

impl AuthorizeStopRequest {
    pub fn new(session_id: impl Into<SessionId>, auth_identity: impl Into<AuthIdentity>) -> Self {
        Self {
            location: None,
            session_id: session_id.into(),
            auth_identity: auth_identity.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuthStopResult {
    Authorized { provider_id: Option<ProviderId> },
    NotAuthorized,
    InvalidSessionId,
    UnknownLocation,
    Offline,
    Error(String),
}

impl_command_result!(AuthStopResult {
    success: AuthStopResult::Authorized { .. },
    labels: {
        Self::Authorized { .. } => "authorized",
        Self::NotAuthorized => "not_authorized",
        Self::InvalidSessionId => "invalid_session_id",
        Self::UnknownLocation => "unknown_location",
        Self::Offline => "offline",
        Self::Error(_) => "error",
    }
});

mod optional_duration {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => crate::shared::serde_duration::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.map(|s| Duration::milliseconds((s * 1000.0).round() as i64)))
    }
}
