pub mod store;

pub use store::{ReservationStore, ReserveOutcome, ReservePolicy};
