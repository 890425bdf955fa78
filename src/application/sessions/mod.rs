pub mod lifecycle;

pub use lifecycle::{
    SessionLifecycle, StopContext, StopOutcome, STOP_REASON_REMOTE, STOP_REASON_RESET,
};
