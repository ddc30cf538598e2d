//! Wake-alarm engine.
//!
//! Computes when alarms fire, arms a platform wake primitive with fallback
//! across precision tiers, plays synthesized or device ringtones, and gates
//! dismissal behind an ordered list of challenges.
//!
//! ```text
//!  trigger ──► wake::WakeScheduler ──WakeEvent──► engine::AlarmEngine
//!                                                       │
//!                                                       ▼
//!                                            session::RingingSession
//!                                              │                  │
//!                                              ▼                  ▼
//!                                 audio::RingtoneSequencer   challenge::DismissalOrchestrator
//!                                              │
//!                                              ▼
//!                                      audio::Synthesizer
//! ```

pub mod announce;
pub mod audio;
pub mod challenge;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod store;
pub mod tracing;
pub mod trigger;
pub mod types;
pub mod wake;

pub use engine::AlarmEngine;
pub use error::{Error, Result};
