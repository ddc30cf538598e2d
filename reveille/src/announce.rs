//! The "now ringing" announcement.
//!
//! Exactly one announcement is made per fire. It carries the alarm id so a
//! restarted process can re-enter the ringing state from it. Rendering the
//! notification is up to the implementation.

use crate::tracing::prelude::*;
use crate::types::{AlarmId, AlarmSpec};

pub trait Announcer: Send + Sync {
    fn announce_ringing(&self, alarm: &AlarmSpec);

    /// Remove the announcement once the session ends.
    fn withdraw(&self, id: AlarmId);
}

/// Announces through the log. Used when the host has no notification
/// facility.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce_ringing(&self, alarm: &AlarmSpec) {
        info!(alarm_id = %alarm.id, label = %alarm.label, "Now ringing");
    }

    fn withdraw(&self, id: AlarmId) {
        debug!(alarm_id = %id, "Ringing announcement withdrawn");
    }
}
