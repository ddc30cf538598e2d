//! Arming and cancelling platform wake-ups for alarms.
//!
//! [`WakeScheduler`] sits between the engine and a [`WakePrimitive`], the
//! OS facility that resumes the process at an instant. Platforms restrict
//! precise wake-ups, so each arm request walks a fixed ladder of
//! [`WakeMode`]s and keeps the first that the primitive accepts:
//!
//! ```text
//!   ExactWhileIdle ──denied──► InexactWhileIdle ──denied──► Deferred
//! ```
//!
//! Failures never reach the caller. If even the last tier is refused the
//! failure is logged and any earlier registration for the alarm is kept.
//!
//! At most one registration exists per alarm id. Arming an id that is
//! already armed replaces the earlier registration.

pub mod timer_queue;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset};

use crate::tracing::prelude::*;
use crate::trigger;
use crate::types::{AlarmId, AlarmSpec, AlarmTime, InvalidAlarmTime, RepeatDays};

pub use timer_queue::{TimerQueue, WakeEvent};

/// Precision tier of a wake registration, most precise first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeMode {
    /// Fires at the instant even if the device is idle. Platforms may
    /// withhold the capability.
    ExactWhileIdle,

    /// Fires at or after the instant while idle, with platform-chosen slack.
    InexactWhileIdle,

    /// Plain deferred wake-up. Last resort.
    Deferred,
}

impl WakeMode {
    /// The tiers in the order they are attempted.
    pub const LADDER: [WakeMode; 3] = [
        WakeMode::ExactWhileIdle,
        WakeMode::InexactWhileIdle,
        WakeMode::Deferred,
    ];
}

impl fmt::Display for WakeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeMode::ExactWhileIdle => write!(f, "exact"),
            WakeMode::InexactWhileIdle => write!(f, "inexact"),
            WakeMode::Deferred => write!(f, "deferred"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WakeError {
    #[error("Permission denied for {0} wake registration")]
    PermissionDenied(WakeMode),

    #[error("Wake primitive unavailable: {0}")]
    Unavailable(String),
}

/// The OS wake-at-instant facility.
///
/// Implementations must treat `register` for an id that is already
/// registered as a replacement.
pub trait WakePrimitive: Send + Sync {
    /// Whether exact wake-ups are currently permitted by platform policy.
    fn can_schedule_exact(&self) -> bool;

    fn register(&self, id: AlarmId, at: OffsetDateTime, mode: WakeMode) -> Result<(), WakeError>;

    fn deregister(&self, id: AlarmId);
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// The local UTC offset in effect at `at`. Differs from `at.offset()`
    /// when a DST change lies between now and `at`.
    fn local_offset_at(&self, at: OffsetDateTime) -> UtcOffset {
        at.offset()
    }
}

/// Local wall clock, falling back to UTC when the local offset cannot be
/// determined.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    fn local_offset_at(&self, at: OffsetDateTime) -> UtcOffset {
        UtcOffset::local_offset_at(at).unwrap_or(at.offset())
    }
}

/// A live registration as tracked by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub at: OffsetDateTime,
    pub mode: WakeMode,
}

pub struct WakeScheduler {
    primitive: Arc<dyn WakePrimitive>,
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<AlarmId, Registration>>,
}

impl WakeScheduler {
    pub fn new(primitive: Arc<dyn WakePrimitive>, clock: Arc<dyn Clock>) -> Self {
        Self {
            primitive,
            clock,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Arm `id` to fire at `at`, replacing any earlier registration.
    ///
    /// Returns the tier that was accepted, or `None` if every tier was
    /// refused.
    /// Registration goes through the primitive's replace-by-id, so the
    /// earlier registration survives if every tier is refused.
    pub fn schedule(&self, id: AlarmId, at: OffsetDateTime) -> Option<WakeMode> {
        let mut pending = self.pending.lock();

        let exact_allowed = self.primitive.can_schedule_exact();
        for mode in WakeMode::LADDER {
            if mode == WakeMode::ExactWhileIdle && !exact_allowed {
                debug!(alarm_id = %id, "Exact wake-ups not permitted, skipping tier");
                continue;
            }

            match self.primitive.register(id, at, mode) {
                Ok(()) => {
                    info!(alarm_id = %id, at = %at, mode = %mode, "Alarm armed");
                    pending.insert(id, Registration { at, mode });
                    return Some(mode);
                }
                Err(e) => {
                    warn!(
                        alarm_id = %id,
                        mode = %mode,
                        error = %e,
                        "Wake registration refused, falling back"
                    );
                }
            }
        }

        error!(
            alarm_id = %id,
            at = %at,
            kept = ?pending.get(&id).map(|r| r.at),
            "All wake registration tiers refused; alarm not re-armed"
        );
        None
    }

    /// Compute the next trigger for `alarm` from the scheduler's clock and
    /// arm it.
    pub fn arm(&self, alarm: &AlarmSpec) -> Result<Option<OffsetDateTime>, InvalidAlarmTime> {
        let at = self.next_trigger(alarm.time()?, alarm.repeat_days, self.clock.now());
        Ok(self.schedule(alarm.id, at).map(|_| at))
    }

    /// [`trigger::next_trigger`] with the result moved to the local offset
    /// in effect on the trigger date, so the alarm keeps its wall-clock
    /// time across a DST change.
    pub fn next_trigger(
        &self,
        at: AlarmTime,
        repeat_days: RepeatDays,
        from: OffsetDateTime,
    ) -> OffsetDateTime {
        let next = trigger::next_trigger(at, repeat_days, from);
        let offset = self.clock.local_offset_at(next);
        if offset == next.offset() {
            return next;
        }

        let local = next.replace_offset(offset);
        if local > from {
            debug!(from = %next.offset(), to = %offset, "Trigger crosses an offset change");
            local
        } else {
            next
        }
    }

    /// Re-arm `id` to fire `minutes` from now.
    pub fn snooze(&self, id: AlarmId, minutes: u32) -> Option<OffsetDateTime> {
        let at = trigger::snooze_trigger(self.clock.now(), minutes);
        self.schedule(id, at).map(|_| at)
    }

    /// Drop the pending registration for `id`, if any.
    pub fn cancel(&self, id: AlarmId) {
        if self.pending.lock().remove(&id).is_some() {
            self.primitive.deregister(id);
            debug!(alarm_id = %id, "Alarm disarmed");
        }
    }

    /// Forget `id` after its wake-up has been delivered.
    ///
    /// Unlike [`cancel`](Self::cancel) this leaves the primitive alone.
    /// A registration made after the fired one is kept.
    pub(crate) fn mark_fired(&self, id: AlarmId, scheduled_for: OffsetDateTime) {
        let mut pending = self.pending.lock();
        if pending.get(&id).is_some_and(|r| r.at == scheduled_for) {
            pending.remove(&id);
        }
    }

    pub fn pending(&self, id: AlarmId) -> Option<Registration> {
        self.pending.lock().get(&id).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, FakePrimitive, FixedClock};
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-03 06:00 UTC);

    fn scheduler(primitive: Arc<FakePrimitive>) -> WakeScheduler {
        WakeScheduler::new(primitive, Arc::new(FixedClock::at(NOW)))
    }

    #[test]
    fn uses_exact_when_permitted() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive.clone());

        let mode = scheduler.schedule(AlarmId(1), datetime!(2024-06-03 07:00 UTC));

        assert_eq!(mode, Some(WakeMode::ExactWhileIdle));
        assert_eq!(primitive.attempted_modes(), vec![WakeMode::ExactWhileIdle]);
    }

    #[test]
    fn skips_exact_when_capability_missing() {
        let primitive = Arc::new(FakePrimitive::new(false));
        let scheduler = scheduler(primitive.clone());

        let mode = scheduler.schedule(AlarmId(1), datetime!(2024-06-03 07:00 UTC));

        assert_eq!(mode, Some(WakeMode::InexactWhileIdle));
        assert_eq!(primitive.attempted_modes(), vec![WakeMode::InexactWhileIdle]);
    }

    #[test]
    fn falls_back_through_every_tier_in_order() {
        let primitive = Arc::new(FakePrimitive::refusing(
            true,
            &[WakeMode::ExactWhileIdle, WakeMode::InexactWhileIdle],
        ));
        let scheduler = scheduler(primitive.clone());

        let mode = scheduler.schedule(AlarmId(1), datetime!(2024-06-03 07:00 UTC));

        assert_eq!(mode, Some(WakeMode::Deferred));
        assert_eq!(primitive.attempted_modes(), WakeMode::LADDER.to_vec());
        assert_eq!(
            scheduler.pending(AlarmId(1)).map(|r| r.mode),
            Some(WakeMode::Deferred)
        );
    }

    #[test]
    fn total_refusal_is_absorbed() {
        let primitive = Arc::new(FakePrimitive::refusing(true, &WakeMode::LADDER));
        let scheduler = scheduler(primitive.clone());

        assert_eq!(scheduler.schedule(AlarmId(1), datetime!(2024-06-03 07:00 UTC)), None);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn refused_reschedule_keeps_earlier_registration() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive.clone());
        let next_day = datetime!(2024-06-04 07:00 UTC);

        scheduler.schedule(AlarmId(1), next_day);
        *primitive.refuse.lock() = WakeMode::LADDER.to_vec();

        assert_eq!(scheduler.snooze(AlarmId(1), 5), None);
        assert_eq!(scheduler.pending(AlarmId(1)).map(|r| r.at), Some(next_day));
        assert_eq!(
            primitive.live.lock().get(&AlarmId(1)).map(|(at, _)| *at),
            Some(next_day)
        );
        assert!(!primitive.calls.lock().contains(&Call::Deregister(AlarmId(1))));
    }

    /// Clock whose local offset changes at `switch`.
    struct DstClock {
        now: OffsetDateTime,
        switch: OffsetDateTime,
        after: UtcOffset,
    }

    impl Clock for DstClock {
        fn now(&self) -> OffsetDateTime {
            self.now
        }

        fn local_offset_at(&self, at: OffsetDateTime) -> UtcOffset {
            if at >= self.switch {
                self.after
            } else {
                self.now.offset()
            }
        }
    }

    #[test]
    fn arm_keeps_wall_clock_time_across_offset_change() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let clock = DstClock {
            now: datetime!(2024-03-30 08:00 +1),
            switch: datetime!(2024-03-31 01:00 UTC),
            after: time::macros::offset!(+2),
        };
        let scheduler = WakeScheduler::new(primitive, Arc::new(clock));
        let alarm = AlarmSpec::new(AlarmId(5), 7, 0);

        let at = scheduler.arm(&alarm).unwrap();

        assert_eq!(at, Some(datetime!(2024-03-31 07:00 +2)));
        assert_eq!(at.map(|at| at.offset()), Some(time::macros::offset!(+2)));
    }

    #[test]
    fn rescheduling_replaces_registration() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive.clone());
        let t1 = datetime!(2024-06-03 07:00 UTC);
        let t2 = datetime!(2024-06-03 07:30 UTC);

        scheduler.schedule(AlarmId(1), t1);
        scheduler.schedule(AlarmId(1), t2);

        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(scheduler.pending(AlarmId(1)).map(|r| r.at), Some(t2));
        assert_eq!(primitive.live.lock().len(), 1);

        scheduler.cancel(AlarmId(1));
        assert_eq!(scheduler.pending_count(), 0);
        assert!(primitive.live.lock().is_empty());
    }

    #[test]
    fn cancel_without_registration_is_noop() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive.clone());

        scheduler.cancel(AlarmId(42));

        assert!(primitive.calls.lock().is_empty());
    }

    #[test]
    fn arm_uses_next_trigger_from_clock() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive.clone());
        let alarm = AlarmSpec::new(AlarmId(5), 7, 0);

        let at = scheduler.arm(&alarm).unwrap();

        assert_eq!(at, Some(datetime!(2024-06-03 07:00 UTC)));
        assert_eq!(
            primitive.calls.lock().first(),
            Some(&Call::Register(
                AlarmId(5),
                datetime!(2024-06-03 07:00 UTC),
                WakeMode::ExactWhileIdle
            ))
        );
    }

    #[test]
    fn arm_rejects_invalid_time() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive);
        let alarm = AlarmSpec::new(AlarmId(5), 25, 0);

        assert!(scheduler.arm(&alarm).is_err());
    }

    #[test]
    fn snooze_rearms_relative_to_clock() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive);

        let at = scheduler.snooze(AlarmId(2), 10);

        assert_eq!(at, Some(datetime!(2024-06-03 06:10 UTC)));
        assert_eq!(scheduler.pending(AlarmId(2)).map(|r| r.at), at);
    }

    #[test]
    fn mark_fired_keeps_newer_registration() {
        let primitive = Arc::new(FakePrimitive::new(true));
        let scheduler = scheduler(primitive);
        let t1 = datetime!(2024-06-03 07:00 UTC);
        let t2 = datetime!(2024-06-04 07:00 UTC);

        scheduler.schedule(AlarmId(1), t2);
        scheduler.mark_fired(AlarmId(1), t1);
        assert_eq!(scheduler.pending(AlarmId(1)).map(|r| r.at), Some(t2));

        scheduler.mark_fired(AlarmId(1), t2);
        assert_eq!(scheduler.pending(AlarmId(1)), None);
    }
}
