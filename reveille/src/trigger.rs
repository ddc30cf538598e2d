//! Next-fire computation for alarms.
//!
//! Pure functions over an injected `now`; nothing here reads a clock. All
//! arithmetic happens in the UTC offset carried by `now`, so "today" means
//! the calendar date of `now` in that offset.
//!
//! Every instant returned is strictly later than the `now` it was computed
//! from.

use time::{Duration, OffsetDateTime};

use crate::types::{AlarmTime, RepeatDays};

/// Compute the next instant an alarm set for `at` must fire.
///
/// One-shot alarms (empty `repeat_days`) fire today at `at` if that is
/// still ahead of `now`, otherwise tomorrow.
///
/// Repeating alarms scan day offsets 0 through 7 from today and take the
/// first candidate that lands on a selected weekday and is later than
/// `now`. Offset 7 is included so a single selected day whose time has
/// just passed today resolves to the same weekday next week.
///
/// The result keeps `now`'s UTC offset. If a DST change falls before it,
/// it is off by the change from local wall-clock time;
/// [`WakeScheduler::next_trigger`](crate::wake::WakeScheduler::next_trigger)
/// corrects for that.
pub fn next_trigger(at: AlarmTime, repeat_days: RepeatDays, now: OffsetDateTime) -> OffsetDateTime {
    let today = now.replace_time(at.as_time());

    if repeat_days.is_one_shot() {
        return if today > now {
            today
        } else {
            today + Duration::DAY
        };
    }

    (0..=7)
        .map(|offset| today + Duration::days(offset))
        .find(|candidate| repeat_days.contains_weekday(candidate.weekday()) && *candidate > now)
        .unwrap_or(today + Duration::days(7))
}

/// Instant a snoozed alarm fires again.
pub fn snooze_trigger(now: OffsetDateTime, snooze_minutes: u32) -> OffsetDateTime {
    now + Duration::minutes(i64::from(snooze_minutes))
}

/// Human-readable time remaining until `trigger`, e.g. `"in 7 h 59 min"`.
///
/// Rounds up to the next whole minute so an alarm 30 seconds away reads
/// "in 1 min" rather than "in 0 min".
pub fn describe_until(now: OffsetDateTime, trigger: OffsetDateTime) -> String {
    let remaining = trigger - now;
    if remaining <= Duration::ZERO {
        return "now".to_string();
    }

    let mut minutes = remaining.whole_minutes();
    if remaining > Duration::minutes(minutes) {
        minutes += 1;
    }

    let days = minutes / (24 * 60);
    let hours = (minutes / 60) % 24;
    let minutes = minutes % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days} d"));
    }
    if hours > 0 {
        parts.push(format!("{hours} h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes} min"));
    }
    format!("in {}", parts.join(" "))
}
