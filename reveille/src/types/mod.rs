//! Shared domain types.

mod alarm;
mod days;

pub use alarm::{AlarmId, AlarmSpec, AlarmTime, InvalidAlarmTime, RingtoneRef};
pub use days::RepeatDays;
