//! Timed playback of composed ringtones.
//!
//! The sequencer runs on its own tokio task. It sleeps until each note's
//! offset from the start of the pass, then hands the note to a separate
//! task that synthesizes and plays it. The sequencing loop never waits for
//! a note to finish, so notes at the same offset sound together as a
//! chord.
//!
//! ```text
//!   t0 ──► wait(offset₀) ──► fire ──► wait(offset₁) ──► fire ... ──► last
//!                                                                   │
//!        Looping: wait(loop gap), t0 := now, start over ◄───────────┤
//!        Preview: wait until t0 + ceiling, release, done ◄──────────┘
//! ```
//!
//! [`PlaybackHandle::cancel`] is synchronous: when it returns the loop will
//! fire nothing more and no note that was in flight can reach the sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::note::{self, NoteEvent};
use super::session::AudioSession;
use super::synth::{Synthesizer, Waveform};
use crate::tracing::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// How long each synthesized note lasts.
    pub note_duration_ms: u32,
    /// Silence between passes in looping mode.
    pub loop_gap_ms: u64,
    /// Total length of a preview, measured from its start.
    pub preview_ceiling_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            note_duration_ms: 500,
            loop_gap_ms: 2_000,
            preview_ceiling_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Repeat until cancelled. Used while an alarm rings.
    Looping,
    /// Play one pass, then stop once the preview ceiling is reached.
    Preview,
}

/// What a [`PlaybackHandle`] ended up playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    Composed { notes: usize },
    DefaultTone,
    DeviceSound(String),
}

/// Serializes sink access against cancellation.
struct Gate {
    open: Mutex<bool>,
    session: AudioSession,
    fired: AtomicUsize,
}

impl Gate {
    fn new(session: AudioSession) -> Self {
        Self {
            open: Mutex::new(true),
            session,
            fired: AtomicUsize::new(0),
        }
    }

    /// Count a note fire if playback is still live.
    fn fire(&self) -> bool {
        let open = self.open.lock();
        if *open {
            self.fired.fetch_add(1, Ordering::Relaxed);
        }
        *open
    }

    fn play_pcm(&self, samples: Arc<[i16]>, sample_rate: u32) {
        let open = self.open.lock();
        if *open {
            self.session.play_pcm(samples, sample_rate);
        }
    }

    fn with_session(&self, play: impl FnOnce(&AudioSession) -> bool) {
        let open = self.open.lock();
        if *open {
            play(&self.session);
        }
    }

    fn close(&self) {
        let mut open = self.open.lock();
        if *open {
            *open = false;
            self.session.stop();
        }
    }
}

/// Synthesizes notes, caching buffers by instrument and frequency.
#[derive(Clone)]
struct NoteRenderer {
    synth: Synthesizer,
    note_duration_ms: u32,
    cache: Arc<Mutex<HashMap<(Waveform, u64), Arc<[i16]>>>>,
}

impl NoteRenderer {
    fn render(&self, note: &NoteEvent) -> Arc<[i16]> {
        let key = (note.instrument, note.frequency_hz.to_bits());
        if let Some(samples) = self.cache.lock().get(&key) {
            return samples.clone();
        }
        let samples: Arc<[i16]> = self
            .synth
            .generate(note.frequency_hz, self.note_duration_ms, note.instrument)
            .into();
        self.cache.lock().insert(key, samples.clone());
        samples
    }
}

pub struct RingtoneSequencer {
    config: SequencerConfig,
    renderer: NoteRenderer,
}

impl RingtoneSequencer {
    pub fn new(synth: Synthesizer, config: SequencerConfig) -> Self {
        Self {
            config,
            renderer: NoteRenderer {
                synth,
                note_duration_ms: config.note_duration_ms,
                cache: Arc::new(Mutex::new(HashMap::new())),
            },
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Parse a note sequence. See [`note::parse_sequence`].
    pub fn parse(sequence: &str) -> Vec<NoteEvent> {
        note::parse_sequence(sequence)
    }

    /// Start playing `events` through `session`.
    ///
    /// Events are played in ascending offset order. An empty list plays
    /// the default tone instead. Must be called from within a tokio
    /// runtime.
    pub fn play(
        &self,
        mut events: Vec<NoteEvent>,
        mode: PlaybackMode,
        session: AudioSession,
    ) -> PlaybackHandle {
        if events.is_empty() {
            info!("No playable notes, falling back to default tone");
            return self.play_default_tone(mode, session);
        }

        events.sort_by_key(|e| e.offset_ms);
        let source = PlaybackSource::Composed {
            notes: events.len(),
        };
        let gate = Arc::new(Gate::new(session));
        let cancel = CancellationToken::new();

        debug!(notes = events.len(), ?mode, "Starting composed playback");
        let task = tokio::spawn(run_sequence(
            events,
            mode,
            self.config,
            self.renderer.clone(),
            gate.clone(),
            cancel.clone(),
        ));

        PlaybackHandle {
            source,
            gate,
            cancel,
            task: Some(task),
        }
    }

    /// Parse and play a persisted sequence.
    pub fn play_sequence(
        &self,
        sequence: &str,
        mode: PlaybackMode,
        session: AudioSession,
    ) -> PlaybackHandle {
        self.play(Self::parse(sequence), mode, session)
    }

    pub fn play_default_tone(&self, mode: PlaybackMode, session: AudioSession) -> PlaybackHandle {
        self.play_looping_sound(PlaybackSource::DefaultTone, mode, session)
    }

    pub fn play_device_sound(
        &self,
        uri: &str,
        mode: PlaybackMode,
        session: AudioSession,
    ) -> PlaybackHandle {
        self.play_looping_sound(PlaybackSource::DeviceSound(uri.to_string()), mode, session)
    }

    /// Sounds the sink loops by itself. Only a preview needs a task, to
    /// stop it at the ceiling.
    fn play_looping_sound(
        &self,
        source: PlaybackSource,
        mode: PlaybackMode,
        session: AudioSession,
    ) -> PlaybackHandle {
        let gate = Arc::new(Gate::new(session));
        let cancel = CancellationToken::new();

        gate.with_session(|session| match &source {
            PlaybackSource::DeviceSound(uri) => session.play_device_sound(uri),
            _ => session.play_default_tone(),
        });

        let task = match mode {
            PlaybackMode::Looping => None,
            PlaybackMode::Preview => {
                let ceiling = Duration::from_millis(self.config.preview_ceiling_ms);
                let gate = gate.clone();
                let cancel = cancel.clone();
                Some(tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(ceiling) => gate.close(),
                    }
                }))
            }
        };

        PlaybackHandle {
            source,
            gate,
            cancel,
            task,
        }
    }
}

async fn run_sequence(
    events: Vec<NoteEvent>,
    mode: PlaybackMode,
    config: SequencerConfig,
    renderer: NoteRenderer,
    gate: Arc<Gate>,
    cancel: CancellationToken,
) {
    let loop_gap = Duration::from_millis(config.loop_gap_ms);
    let ceiling = Duration::from_millis(config.preview_ceiling_ms);
    let sample_rate = renderer.synth.sample_rate();

    loop {
        let t0 = Instant::now();

        for note in &events {
            let due = t0 + Duration::from_millis(note.offset_ms);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(due) => {}
            }

            if !gate.fire() {
                return;
            }

            let note = *note;
            let renderer = renderer.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                let samples = renderer.render(&note);
                gate.play_pcm(samples, sample_rate);
            });
        }

        match mode {
            PlaybackMode::Looping => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(loop_gap) => {}
                }
                trace!("Restarting ringtone pass");
            }
            PlaybackMode::Preview => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(t0 + ceiling) => {}
                }
                gate.close();
                debug!("Preview finished");
                return;
            }
        }
    }
}

/// Control over one playback started by [`RingtoneSequencer`].
///
/// Dropping the handle cancels the playback.
pub struct PlaybackHandle {
    source: PlaybackSource,
    gate: Arc<Gate>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    pub fn source(&self) -> &PlaybackSource {
        &self.source
    }

    pub fn is_default_tone(&self) -> bool {
        self.source == PlaybackSource::DefaultTone
    }

    /// Notes dispatched so far, across all passes.
    pub fn notes_fired(&self) -> usize {
        self.gate.fired.load(Ordering::Relaxed)
    }

    /// Stop playback. No note fires and no sound starts after this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.gate.close();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// True once playback has ended on its own or been cancelled.
    pub fn is_finished(&self) -> bool {
        !*self.gate.open.lock()
    }

    /// Wait for a preview to run to its end.
    ///
    /// Looping playback only ends by cancellation; awaiting it without
    /// cancelling elsewhere waits forever.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Playback task failed");
                }
            }
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
