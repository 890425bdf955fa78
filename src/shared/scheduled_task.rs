//! Periodic background jobs with at-most-one-in-flight semantics.
//!
//! A [`ScheduledTask`] runs a job on a fixed interval inside a `tokio::spawn`
//! loop. Ticks that fire while the job is still running are skipped rather
//! than queued, and the task stops when its [`CancellationSignal`] fires, when
//! the job asks to stop, or when the handle is dropped.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::cancellation::CancellationSignal;

/// Shared "a run is in progress" flag.
///
/// The timer loop acquires it before every run; a tick that finds it held is
/// skipped. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when a run is already in flight.
    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        if self.busy.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(InFlightPermit {
                busy: self.busy.clone(),
            })
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop.
#[derive(Debug)]
pub struct InFlightPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Handle to a running periodic job.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    cancel: CancellationSignal,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn `job` every `period`. The first run happens after one full period.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        guard: InFlightGuard,
        cancel: CancellationSignal,
        mut job: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let stop = cancel.clone();
        let handle = tokio::spawn(async move {
            debug!(task = name, period_ms = period.as_millis() as u64, "Scheduled task started");

            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(_permit) = guard.try_acquire() else {
                            debug!(task = name, "Previous run still in flight, tick skipped");
                            continue;
                        };
                        if job().await.is_break() {
                            debug!(task = name, "Scheduled task finished on request");
                            break;
                        }
                    }
                    _ = stop.cancelled() => {
                        break;
                    }
                }
            }

            debug!(task = name, "Scheduled task stopped");
        });

        info!(task = name, "⏱ Scheduled task armed");
        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Disarm the task. In-flight runs are aborted at their next await point.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn guard_allows_one_permit_at_a_time() {
        let guard = InFlightGuard::new();
        let permit = guard.try_acquire().expect("first permit");
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn task_runs_periodically_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = ScheduledTask::spawn(
            "test",
            Duration::from_millis(10),
            InFlightGuard::new(),
            CancellationSignal::new(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ControlFlow::Continue(())
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        task.stop();
        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several runs, got {seen}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn ticks_are_skipped_while_guard_is_held() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let guard = InFlightGuard::new();
        let permit = guard.try_acquire().expect("permit");

        let _task = ScheduledTask::spawn(
            "skipped",
            Duration::from_millis(10),
            guard.clone(),
            CancellationSignal::new(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ControlFlow::Continue(())
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        drop(permit);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn break_ends_the_loop() {
        let task = ScheduledTask::spawn(
            "once",
            Duration::from_millis(5),
            InFlightGuard::new(),
            CancellationSignal::new(),
            || async { ControlFlow::Break(()) },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(task.is_finished());
    }
}
