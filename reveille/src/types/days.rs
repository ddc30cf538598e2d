//! Repeat-day set for recurring alarms.
//!
//! Days are indexed Monday-first: Mon=0, Tue=1, ... Sun=6. Every caller
//! that builds a [`RepeatDays`] from persisted indices, and the trigger
//! calculator that reads it back, uses this convention. An empty set means
//! the alarm is one-shot.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use time::Weekday;

bitflags! {
    /// Set of weekdays on which an alarm repeats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RepeatDays: u8 {
        const MON = 1 << 0;
        const TUE = 1 << 1;
        const WED = 1 << 2;
        const THU = 1 << 3;
        const FRI = 1 << 4;
        const SAT = 1 << 5;
        const SUN = 1 << 6;

        const WEEKDAYS = Self::MON.bits()
            | Self::TUE.bits()
            | Self::WED.bits()
            | Self::THU.bits()
            | Self::FRI.bits();
        const WEEKEND = Self::SAT.bits() | Self::SUN.bits();
        const EVERY_DAY = Self::WEEKDAYS.bits() | Self::WEEKEND.bits();
    }
}

const SHORT_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

impl RepeatDays {
    /// The single-day set for a Monday-first index, or `None` past Sunday.
    pub fn from_index(index: u8) -> Option<Self> {
        if index < 7 {
            Some(Self::from_bits_retain(1 << index))
        } else {
            None
        }
    }

    pub fn from_weekday(weekday: Weekday) -> Self {
        Self::from_bits_retain(1 << weekday.number_days_from_monday())
    }

    pub fn contains_weekday(self, weekday: Weekday) -> bool {
        self.contains(Self::from_weekday(weekday))
    }

    /// True when the set is empty and the alarm fires only once.
    pub fn is_one_shot(self) -> bool {
        self.is_empty()
    }

    /// Monday-first indices of the days in the set, ascending.
    pub fn indices(self) -> impl Iterator<Item = u8> {
        (0..7u8).filter(move |i| self.bits() & (1 << i) != 0)
    }

    /// Parse a comma-separated day list such as `"mon,wed,fri"`.
    ///
    /// Also accepts the shorthands `weekdays`, `weekend` and `daily`.
    /// Unknown names yield `None`.
    pub fn parse_list(list: &str) -> Option<Self> {
        let mut days = Self::empty();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let lower = name.to_ascii_lowercase();
            let day = match lower.as_str() {
                "weekdays" => Self::WEEKDAYS,
                "weekend" => Self::WEEKEND,
                "daily" | "everyday" => Self::EVERY_DAY,
                _ => {
                    let index = SHORT_NAMES
                        .iter()
                        .position(|short| lower.starts_with(&short.to_ascii_lowercase()))?;
                    Self::from_bits_retain(1 << index)
                }
            };
            days |= day;
        }
        Some(days)
    }
}

impl fmt::Display for RepeatDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "once");
        }
        if *self == Self::EVERY_DAY {
            return write!(f, "daily");
        }
        let names: Vec<&str> = self.indices().map(|i| SHORT_NAMES[i as usize]).collect();
        write!(f, "{}", names.join(","))
    }
}

// Persisted as a list of Monday-first indices, e.g. `[0, 2, 4]`.

impl Serialize for RepeatDays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.indices())
    }
}

impl<'de> Deserialize<'de> for RepeatDays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let indices = Vec::<u8>::deserialize(deserializer)?;
        let mut days = Self::empty();
        for index in indices {
            days |= Self::from_index(index).ok_or_else(|| {
                de::Error::custom(format!("day index {index} out of range (Mon=0..Sun=6)"))
            })?;
        }
        Ok(days)
    }
}
