//! Command dispatcher: fallback routing and the shared command envelope.
//!
//! Every EVSE command runs through [`run_command`], which emits the
//! request/response notification pair, enforces the caller's timeout and
//! cancellation, turns panics into `Error` results and records latency
//! metrics. Where the command is executed is decided by a [`FallbackChain`]
//! resolved once per call.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::{error, info, warn};

use super::controller::SharedController;
use crate::application::events::EventBus;
use crate::domain::commands::{CommandKind, CommandOptions, CommandResponse, CommandResult, HopLevel};
use crate::domain::error::ControllerResult;
use crate::domain::events::{CommandCompletedEvent, CommandRequestedEvent, Event};
use crate::domain::ids::EvseId;
use crate::shared::{CancellationSignal, Clock};

/// Record command outcome and latency.
fn record_command_latency(command: CommandKind, result: &'static str, elapsed: Duration) {
    let command = command.as_str();
    metrics::histogram!("evse_command_latency_seconds", "command" => command)
        .record(elapsed.as_secs_f64());
    metrics::counter!("evse_commands_total", "command" => command, "result" => result)
        .increment(1);
}

// ─── Fallback chain ────────────────────────────────────────────────

/// One place a command can be executed
#[derive(Clone)]
pub enum Executor {
    /// The EVSE's own engine (virtual EVSEs only)
    Local,
    Remote {
        level: HopLevel,
        controller: SharedController,
    },
}

impl Executor {
    pub fn level(&self) -> HopLevel {
        match self {
            Executor::Local => HopLevel::Local,
            Executor::Remote { level, .. } => *level,
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Executor::Local => f.write_str("Local"),
            Executor::Remote { level, controller } => f
                .debug_struct("Remote")
                .field("level", level)
                .field("controller", &controller.id())
                .finish(),
        }
    }
}

/// Ordered list of executors, most specific first.
///
/// Only present hops are pushed, so the first entry is the one that answers.
#[derive(Clone, Debug, Default)]
pub struct FallbackChain {
    hops: Vec<Executor>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_local(&mut self) -> &mut Self {
        self.hops.push(Executor::Local);
        self
    }

    /// Push `controller` at `level` if there is one.
    pub fn push_remote(&mut self, level: HopLevel, controller: Option<SharedController>) -> &mut Self {
        if let Some(controller) = controller {
            self.hops.push(Executor::Remote { level, controller });
        }
        self
    }

    /// The executor that will answer, `None` means Offline.
    pub fn first(&self) -> Option<&Executor> {
        self.hops.first()
    }

    /// First executor accepted by `pred`.
    pub fn first_where(&self, pred: impl Fn(&Executor) -> bool) -> Option<&Executor> {
        self.hops.iter().find(|hop| pred(hop))
    }

    pub fn hops(&self) -> &[Executor] {
        &self.hops
    }

    pub fn levels(&self) -> Vec<HopLevel> {
        self.hops.iter().map(Executor::level).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

// ─── Command envelope ──────────────────────────────────────────────

/// A result together with the hop that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Answer<R> {
    pub result: R,
    pub executed_by: Option<HopLevel>,
}

impl<R> Answer<R> {
    /// Answered by a precondition check before any executor was involved.
    pub fn precondition(result: R) -> Self {
        Self {
            result,
            executed_by: None,
        }
    }

    pub fn by(level: HopLevel, result: R) -> Self {
        Self {
            result,
            executed_by: Some(level),
        }
    }
}

impl<R: CommandResult> Answer<R> {
    /// Nobody in the chain can execute the command.
    pub fn offline() -> Self {
        Self::precondition(R::offline())
    }

    /// Convert a controller reply; failures become `Error(message)`.
    pub fn from_controller(level: HopLevel, controller_id: &str, reply: ControllerResult<R>) -> Self {
        match reply {
            Ok(result) => Self::by(level, result),
            Err(e) => {
                warn!(controller = controller_id, %level, error = %e, "Controller call failed");
                Self::by(level, R::error(e.to_string()))
            }
        }
    }
}

/// Where a command runs and who hears about it
pub struct CommandScope<'a> {
    pub evse_id: &'a EvseId,
    pub command: CommandKind,
    pub bus: &'a EventBus,
    pub clock: &'a dyn Clock,
}

/// Run `work` inside the command envelope.
///
/// Cancellation wins over completion when both are ready. Neither timeout nor
/// cancellation can interrupt a local state change: the engine applies those
/// synchronously once it holds the EVSE lock.
pub async fn run_command<R, Fut>(
    scope: CommandScope<'_>,
    options: &CommandOptions,
    work: Fut,
) -> CommandResponse<R>
where
    R: CommandResult,
    Fut: Future<Output = Answer<R>>,
{
    let request_id = uuid::Uuid::new_v4().to_string();
    scope.bus.publish(Event::CommandRequested(CommandRequestedEvent {
        evse_id: scope.evse_id.clone(),
        command: scope.command,
        request_id: request_id.clone(),
        timestamp: scope.clock.now(),
    }));

    let started = Instant::now();
    let guarded = AssertUnwindSafe(work).catch_unwind();

    let answer = tokio::select! {
        biased;
        _ = wait_cancelled(options.cancel.as_ref()) => {
            Answer::precondition(R::error("Command canceled"))
        }
        outcome = guarded => match outcome {
            Ok(answer) => answer,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(evse_id = %scope.evse_id, command = %scope.command, panic = %message, "Command panicked");
                Answer::precondition(R::error(format!("Command panicked: {}", message)))
            }
        },
        _ = wait_timeout(options.timeout) => {
            let ms = options.timeout.map(|d| d.as_millis()).unwrap_or_default();
            Answer::precondition(R::error(format!("Command timed out after {} ms", ms)))
        }
    };

    let runtime = started.elapsed();
    let label = answer.result.label();
    record_command_latency(scope.command, label, runtime);

    info!(
        evse_id = %scope.evse_id,
        command = %scope.command,
        result = label,
        executed_by = answer.executed_by.map(|l| l.as_str()).unwrap_or("-"),
        runtime_ms = runtime.as_millis() as u64,
        "Command completed"
    );

    scope.bus.publish(Event::CommandCompleted(CommandCompletedEvent {
        evse_id: scope.evse_id.clone(),
        command: scope.command,
        request_id,
        result: label.to_string(),
        executed_by: answer.executed_by,
        runtime_ms: runtime.as_millis() as u64,
        timestamp: scope.clock.now(),
    }));

    CommandResponse {
        result: answer.result,
        runtime,
        executed_by: answer.executed_by,
    }
}

async fn wait_cancelled(signal: Option<&CancellationSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

async fn wait_timeout(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
