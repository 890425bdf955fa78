//! Reservation aggregate

pub mod model;

pub use model::{CancelReservationReason, Reservation, ReservationLevel};
