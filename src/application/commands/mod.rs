//! Command execution: the controller port and the fallback dispatcher.

pub mod controller;
pub mod dispatcher;

pub use crate::domain::commands::HopLevel;
pub use controller::{RemoteController, SharedController};
pub use dispatcher::{run_command, Answer, CommandScope, Executor, FallbackChain};
