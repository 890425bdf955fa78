//! Admin and operational status of an EVSE

use serde::{Deserialize, Serialize};

/// Operator-controlled availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AdminStatus {
    #[default]
    Operational,
    /// Usable, but only by the operator's own staff and test tokens
    InternalUse,
    OutOfService,
    Planned,
    InDeployment,
    Unknown,
}

impl AdminStatus {
    /// Whether commands that claim the EVSE (reserve, remote start) may proceed.
    pub fn accepts_commands(&self) -> bool {
        matches!(self, Self::Operational | Self::InternalUse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "Operational",
            Self::InternalUse => "InternalUse",
            Self::OutOfService => "OutOfService",
            Self::Planned => "Planned",
            Self::InDeployment => "InDeployment",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AdminStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "operational" => Self::Operational,
            "internaluse" => Self::InternalUse,
            "outofservice" => Self::OutOfService,
            "planned" => Self::Planned,
            "indeployment" => Self::InDeployment,
            _ => Self::Unknown,
        }
    }
}

/// Physical / observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OperationalStatus {
    #[default]
    Available,
    Reserved,
    Charging,
    OutOfService,
    Offline,
    Faulted,
}

impl OperationalStatus {
    /// Statuses the engine derives from its own reservation/session state.
    /// Everything else is reported by hardware.
    pub fn is_engine_derived(&self) -> bool {
        matches!(self, Self::Available | Self::Reserved | Self::Charging)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Reserved => "Reserved",
            Self::Charging => "Charging",
            Self::OutOfService => "OutOfService",
            Self::Offline => "Offline",
            Self::Faulted => "Faulted",
        }
    }
}

impl std::fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for OperationalStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "available" => Self::Available,
            "reserved" => Self::Reserved,
            "charging" => Self::Charging,
            "outofservice" => Self::OutOfService,
            "offline" => Self::Offline,
            _ => Self::Faulted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_operational_and_internal_use_accept_commands() {
        assert!(AdminStatus::Operational.accepts_commands());
        assert!(AdminStatus::InternalUse.accepts_commands());
        assert!(!AdminStatus::OutOfService.accepts_commands());
        assert!(!AdminStatus::Planned.accepts_commands());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(AdminStatus::from("outOfService"), AdminStatus::OutOfService);
        assert_eq!(OperationalStatus::from("CHARGING"), OperationalStatus::Charging);
        assert_eq!(OperationalStatus::from("smoke"), OperationalStatus::Faulted);
    }

    #[test]
    fn engine_derived_statuses() {
        assert!(OperationalStatus::Reserved.is_engine_derived());
        assert!(!OperationalStatus::Faulted.is_engine_derived());
    }
}
