pub mod cancellation;
pub mod clock;
pub mod scheduled_task;
pub mod serde_duration;

pub use cancellation::{cancel_on_ctrl_c, CancellationSignal};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use scheduled_task::{InFlightGuard, InFlightPermit, ScheduledTask};
