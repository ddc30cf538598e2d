//! Alarm definitions as read from the alarm store.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Time;

use super::days::RepeatDays;

/// Stable identifier of an alarm in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(pub u32);

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid alarm time {hour:02}:{minute:02} (hour must be 0-23, minute 0-59)")]
pub struct InvalidAlarmTime {
    pub hour: u8,
    pub minute: u8,
}

/// Wall-clock time of day an alarm rings at, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmTime(Time);

impl AlarmTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, InvalidAlarmTime> {
        Time::from_hms(hour, minute, 0)
            .map(Self)
            .map_err(|_| InvalidAlarmTime { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.0.hour()
    }

    pub fn minute(&self) -> u8 {
        self.0.minute()
    }

    pub fn as_time(&self) -> Time {
        self.0
    }

    /// Parse `HH:MM`.
    pub fn parse(text: &str) -> Option<Self> {
        let (hour, minute) = text.trim().split_once(':')?;
        Self::new(hour.parse().ok()?, minute.parse().ok()?).ok()
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Which sound an alarm plays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RingtoneRef {
    /// The platform's default alert tone.
    #[default]
    Default,

    /// A sound provided by the device, addressed by URI.
    DeviceSound(String),

    /// A user-composed ringtone, by its id in the store.
    Composed(u32),
}

/// An alarm as persisted by the alarm store.
///
/// The engine only reads these; the store's owner creates and edits them.
/// Challenge tags are kept as raw strings so that tags written by a newer
/// version survive a round trip through this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSpec {
    pub id: AlarmId,
    pub hour: u8,
    pub minute: u8,
    #[serde(default)]
    pub repeat_days: RepeatDays,
    #[serde(default)]
    pub ringtone: RingtoneRef,
    /// Snooze length in minutes. Zero disables snoozing.
    #[serde(default)]
    pub snooze_minutes: u32,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub label: String,
}

fn default_active() -> bool {
    true
}

impl AlarmSpec {
    /// A one-shot alarm with the default tone and no challenges.
    pub fn new(id: AlarmId, hour: u8, minute: u8) -> Self {
        Self {
            id,
            hour,
            minute,
            repeat_days: RepeatDays::empty(),
            ringtone: RingtoneRef::Default,
            snooze_minutes: 0,
            challenges: Vec::new(),
            active: true,
            label: String::new(),
        }
    }

    pub fn time(&self) -> Result<AlarmTime, InvalidAlarmTime> {
        AlarmTime::new(self.hour, self.minute)
    }

    pub fn is_repeating(&self) -> bool {
        !self.repeat_days.is_one_shot()
    }

    pub fn snooze_enabled(&self) -> bool {
        self.snooze_minutes > 0
    }
}
