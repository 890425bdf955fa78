//! EVSE aggregate and its command surface

mod aggregate;
mod commands;
pub mod settings;
mod tasks;

pub use aggregate::{Evse, EvseBuilder, EvseKind, ENGINE_SOURCE};
pub use settings::EvseSettings;
