//! Background tasks of an EVSE
//!
//! The reservation expiry sweep runs for the EVSE's whole lifetime; the
//! metering tick only while a locally started session is active. Both hold a
//! weak reference, so a dropped EVSE is never kept alive by its own timers.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info};

use super::aggregate::{Evse, EvseInner};
use crate::domain::events::{Event, MeterSampleEvent};
use crate::shared::{InFlightGuard, ScheduledTask};

pub(super) fn spawn_expiry_sweep(inner: &Arc<EvseInner>) -> ScheduledTask {
    let weak = Arc::downgrade(inner);
    let period = inner.settings.expiry_check_interval;
    info!(evse_id = %inner.id, check_interval_secs = period.as_secs(), "📅 Reservation expiry sweep started");

    ScheduledTask::spawn(
        "reservation-expiry",
        period,
        InFlightGuard::new(),
        inner.lifetime.child(),
        move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let evse = Evse { inner };
                let expired = evse.check_reservation_expiry().await;
                if !expired.is_empty() {
                    debug!(evse_id = %evse.id(), count = expired.len(), "Expiry sweep removed reservations");
                }
                ControlFlow::Continue(())
            }
        },
    )
}

pub(super) fn spawn_metering(inner: &Arc<EvseInner>) -> ScheduledTask {
    let weak = Arc::downgrade(inner);
    debug!(evse_id = %inner.id, "Metering armed");

    ScheduledTask::spawn(
        "metering",
        inner.settings.metering_interval,
        inner.metering_guard.clone(),
        inner.lifetime.child(),
        move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let sample = {
                    let mut state = inner.state.lock().await;
                    let now = inner.clock.now();
                    state.sessions.tick(now)
                };
                match sample {
                    Some((session_id, sample)) => {
                        inner.bus.publish(Event::MeterSampleRecorded(MeterSampleEvent {
                            evse_id: inner.id.clone(),
                            session_id,
                            sample,
                        }));
                        ControlFlow::Continue(())
                    }
                    None => {
                        let charging = inner.state.lock().await.sessions.is_charging();
                        if charging {
                            ControlFlow::Continue(())
                        } else {
                            ControlFlow::Break(())
                        }
                    }
                }
            }
        },
    )
}
