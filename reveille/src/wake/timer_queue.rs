//! In-process wake primitive backed by tokio timers.
//!
//! Each registration is a sleeping task; when it wakes it sends a
//! [`WakeEvent`] on the queue's channel. Suitable for hosts where the
//! process stays resident (desktop daemons, tests). Platforms with a real
//! alarm service implement [`WakePrimitive`] over that service instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Clock, WakeError, WakeMode, WakePrimitive};
use crate::tracing::prelude::*;
use crate::types::AlarmId;

/// Delivered when a registration's instant is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeEvent {
    pub alarm_id: AlarmId,
    pub scheduled_for: OffsetDateTime,
    pub mode: WakeMode,
}

struct Timer {
    generation: u64,
    cancel: CancellationToken,
}

pub struct TimerQueue {
    exact_permitted: bool,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    fired_tx: mpsc::UnboundedSender<WakeEvent>,
    timers: Arc<Mutex<HashMap<AlarmId, Timer>>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl TimerQueue {
    /// Create a queue on the current tokio runtime.
    ///
    /// `exact_permitted` stands in for the platform policy that grants or
    /// withholds exact wake-ups. Cancelling `shutdown` stops every pending
    /// timer and makes further registrations fail.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(
        exact_permitted: bool,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<WakeEvent>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let queue = Self {
            exact_permitted,
            clock,
            runtime: Handle::current(),
            fired_tx,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            shutdown,
        };
        (queue, fired_rx)
    }

    /// Number of timers still waiting to fire.
    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WakePrimitive for TimerQueue {
    fn can_schedule_exact(&self) -> bool {
        self.exact_permitted
    }

    fn register(&self, id: AlarmId, at: OffsetDateTime, mode: WakeMode) -> Result<(), WakeError> {
        if mode == WakeMode::ExactWhileIdle && !self.exact_permitted {
            return Err(WakeError::PermissionDenied(mode));
        }
        if self.shutdown.is_cancelled() {
            return Err(WakeError::Unavailable("timer queue shut down".into()));
        }

        // Instants already in the past fire on the next poll.
        let delay = Duration::try_from(at - self.clock.now()).unwrap_or(Duration::ZERO);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();

        if let Some(previous) = self.timers.lock().insert(
            id,
            Timer {
                generation,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }

        let timers = self.timers.clone();
        let fired_tx = self.fired_tx.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let mut timers = timers.lock();
                    if timers.get(&id).is_some_and(|t| t.generation == generation) {
                        timers.remove(&id);
                    }
                    trace!(alarm_id = %id, "Timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut timers = timers.lock();
                        if timers.get(&id).is_some_and(|t| t.generation == generation) {
                            timers.remove(&id);
                        } else {
                            return;
                        }
                    }
                    let event = WakeEvent { alarm_id: id, scheduled_for: at, mode };
                    if fired_tx.send(event).is_err() {
                        debug!(alarm_id = %id, "Wake event receiver dropped");
                    }
                }
            }
        });

        Ok(())
    }

    fn deregister(&self, id: AlarmId) {
        if let Some(timer) = self.timers.lock().remove(&id) {
            timer.cancel.cancel();
        }
    }
}
