//! Domain errors
//!
//! Expected domain outcomes (unknown reservation, EVSE in use, ...) are result
//! enums in [`crate::domain::commands`]. The errors here are the unexpected
//! ones a collaborator can raise; the EVSE converts them into `Error` results.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Controller {0} is not reachable")]
    Unreachable(String),

    #[error("Controller rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid response from controller: {0}")]
    InvalidResponse(String),

    #[error("Controller timeout for {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

/// Result type for collaborator calls
pub type ControllerResult<T> = Result<T, ControllerError>;
