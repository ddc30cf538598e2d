//! Crate-level error type.
//!
//! Component errors ([`WakeError`](crate::wake::WakeError),
//! [`AudioError`](crate::audio::AudioError),
//! [`SessionError`](crate::session::SessionError)) live next to their
//! components. This type covers the store boundary and configuration.

use thiserror::Error;

use crate::types::{AlarmId, InvalidAlarmTime};

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid alarm {id}: {source}")]
    InvalidAlarm {
        id: AlarmId,
        #[source]
        source: InvalidAlarmTime,
    },

    #[error("Alarm {0} not found")]
    AlarmNotFound(AlarmId),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
