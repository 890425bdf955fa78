//! Charging session aggregate

pub mod model;

pub use model::{
    estimate_energy_wh, ChargeDetailRecord, ChargingSession, MeterSample, MeterSampleKind,
    ReservationHandling,
};
