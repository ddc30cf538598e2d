//! The ringing session: one fired alarm from ring to snooze or dismissal.
//!
//! # State Machine
//!
//! ```text
//!  Idle ──fire──► Firing ──sound started──► Presenting ──snooze──► Snoozed
//!                                               │  │
//!                                               │  └──dismiss (challenges done)──► Dismissed
//!                                               └──abort──► Aborted
//! ```
//!
//! A session runs as a tokio task that owns the challenge state. Callers
//! talk to it through a cloneable [`SessionHandle`]: inputs and sensor
//! readings are queued without blocking, snooze and dismiss wait for the
//! actor's reply, and [`SessionHandle::abort`] acts synchronously. Every
//! change is published as a [`SessionSnapshot`] on a watch channel.
//!
//! The session never ends on its own. Only snooze, dismiss or abort end it.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audio::{
    AudioBackend, AudioSession, NoteEvent, PlaybackHandle, PlaybackMode, RingtoneSequencer,
};
use crate::challenge::{
    Challenge, ChallengeConfig, ChallengeOutcome, ChallengeView, DismissalOrchestrator, Progress,
};
use crate::tracing::prelude::*;
use crate::types::{AlarmId, AlarmSpec};
use crate::wake::WakeScheduler;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Snooze is disabled for this alarm")]
    SnoozeDisabled,

    #[error("{remaining} challenge(s) left before dismissal")]
    ChallengesPending { remaining: usize },

    #[error("Session has ended")]
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Firing,
    Presenting,
    /// Ended by snooze. `until` is the re-armed instant, if arming worked.
    Snoozed { until: Option<OffsetDateTime> },
    Dismissed,
    /// Ended from outside, e.g. superseded by a newer fire.
    Aborted,
}

impl SessionState {
    pub fn is_ended(self) -> bool {
        matches!(
            self,
            SessionState::Snoozed { .. } | SessionState::Dismissed | SessionState::Aborted
        )
    }
}

/// Published view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub alarm_id: AlarmId,
    pub state: SessionState,
    pub started_at: OffsetDateTime,
    pub challenge_index: usize,
    pub challenge_count: usize,
    pub challenge: Option<ChallengeView>,
    pub can_snooze: bool,
    pub can_dismiss: bool,
    /// The audio device could not be opened.
    pub silent: bool,
}

/// What to play while ringing.
#[derive(Debug, Clone, PartialEq)]
pub enum Ringtone {
    Default,
    Device(String),
    Composed(Vec<NoteEvent>),
}

/// User and sensor input for the current challenge.
///
/// Input meant for a different kind than the one presented is ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeInput {
    Answer(String),
    /// Impulse magnitude in g.
    Impulse(f64),
    /// Raw accelerometer reading in m/s².
    Acceleration { x: f64, y: f64, z: f64 },
    /// Cumulative step counter.
    Steps(u64),
    StepSensorLost,
    Scan(String),
    Tap(usize),
}

/// Shared collaborators for starting sessions.
#[derive(Clone)]
pub struct SessionContext {
    pub sequencer: Arc<RingtoneSequencer>,
    pub scheduler: Arc<WakeScheduler>,
    pub audio: Arc<dyn AudioBackend>,
    pub challenges: ChallengeConfig,
}

enum Command {
    Input(ChallengeInput),
    Abandon,
    Snooze(oneshot::Sender<Result<Option<OffsetDateTime>, SessionError>>),
    Dismiss(oneshot::Sender<Result<(), SessionError>>),
}

/// State touched both by the actor and by synchronous abort.
struct Shared {
    cancel: CancellationToken,
    audio: AudioSession,
    playback: Mutex<Option<PlaybackHandle>>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn is_ended(&self) -> bool {
        self.snapshot.borrow().state.is_ended()
    }

    fn stop_sound(&self) {
        if let Some(playback) = self.playback.lock().take() {
            playback.cancel();
        }
    }

    /// Move to a final state. Returns false if the session already ended.
    fn end(&self, state: SessionState) -> bool {
        let mut playback = self.playback.lock();
        if self.is_ended() {
            return false;
        }
        if let Some(playback) = playback.take() {
            playback.cancel();
        }
        self.audio.release();
        self.cancel.cancel();
        self.snapshot.send_modify(|s| {
            s.state = state;
            s.can_snooze = false;
        });
        true
    }
}

pub struct RingingSession {
    alarm: AlarmSpec,
    ctx: SessionContext,
    orchestrator: DismissalOrchestrator,
    challenge: Option<Challenge>,
    /// First and highest step counts seen in this session.
    step_readings: Option<(u64, u64)>,
    rng: StdRng,
    shared: Arc<Shared>,
}

impl RingingSession {
    /// Start ringing for `alarm` and return a handle to the session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(alarm: &AlarmSpec, ringtone: Ringtone, ctx: &SessionContext) -> SessionHandle {
        let orchestrator = DismissalOrchestrator::new(&alarm.challenges);
        let started_at = ctx.scheduler.clock().now();
        let audio = AudioSession::acquire(ctx.audio.as_ref());

        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            alarm_id: alarm.id,
            state: SessionState::Firing,
            started_at,
            challenge_index: orchestrator.index(),
            challenge_count: orchestrator.len(),
            challenge: None,
            can_snooze: alarm.snooze_enabled(),
            can_dismiss: orchestrator.is_terminal(),
            silent: audio.is_silent(),
        });

        let playback = match ringtone {
            Ringtone::Composed(notes) => {
                ctx.sequencer.play(notes, PlaybackMode::Looping, audio.clone())
            }
            Ringtone::Device(uri) => {
                ctx.sequencer.play_device_sound(&uri, PlaybackMode::Looping, audio.clone())
            }
            Ringtone::Default => ctx
                .sequencer
                .play_default_tone(PlaybackMode::Looping, audio.clone()),
        };

        let shared = Arc::new(Shared {
            cancel: CancellationToken::new(),
            audio,
            playback: Mutex::new(Some(playback)),
            snapshot: snapshot_tx,
        });

        let mut session = RingingSession {
            alarm: alarm.clone(),
            ctx: ctx.clone(),
            orchestrator,
            challenge: None,
            step_readings: None,
            rng: StdRng::from_os_rng(),
            shared: shared.clone(),
        };
        session.present_current();
        session.publish(|s| s.state = SessionState::Presenting);
        info!(
            alarm_id = %alarm.id,
            challenges = session.orchestrator.len(),
            silent = shared.audio.is_silent(),
            "Alarm ringing"
        );

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(session.run(cmd_rx));

        SessionHandle {
            alarm_id: alarm.id,
            cmd_tx,
            snapshot_rx,
            shared,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let cancel = self.shared.cancel.clone();
        loop {
            let deadline = self.challenge.as_ref().and_then(Challenge::deadline);

            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = sleep_until(deadline) => {
                    self.tick();
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!(alarm_id = %self.alarm.id, "All session handles dropped");
                        self.shared.end(SessionState::Aborted);
                        break;
                    }
                },
            }
        }
        trace!(alarm_id = %self.alarm.id, "Session task exiting");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Input(input) => self.handle_input(input),
            Command::Abandon => {
                self.orchestrator.report(ChallengeOutcome::Abandoned);
                self.present_current();
                self.publish(|_| {});
            }
            Command::Snooze(reply) => {
                let _ = reply.send(self.snooze());
            }
            Command::Dismiss(reply) => {
                let _ = reply.send(self.dismiss());
            }
        }
    }

    fn handle_input(&mut self, input: ChallengeInput) {
        if let ChallengeInput::Steps(cumulative) = &input {
            let readings = self.step_readings.get_or_insert((*cumulative, *cumulative));
            readings.1 = readings.1.max(*cumulative);
        }
        let Some(challenge) = self.challenge.as_mut() else {
            return;
        };
        let now = Instant::now();

        let progress = match (challenge, input) {
            (Challenge::Arithmetic(c), ChallengeInput::Answer(answer)) => c.submit(&answer),
            (Challenge::Shake(c), ChallengeInput::Impulse(magnitude)) => {
                c.on_impulse(magnitude, now)
            }
            (Challenge::Shake(c), ChallengeInput::Acceleration { x, y, z }) => {
                c.on_acceleration(x, y, z, now)
            }
            (Challenge::Steps(c), ChallengeInput::Steps(cumulative)) => c.on_steps(cumulative),
            (Challenge::Steps(c), ChallengeInput::StepSensorLost) => {
                c.sensor_lost();
                Progress::Pending
            }
            (Challenge::Scan(c), ChallengeInput::Scan(payload)) => c.on_scan(&payload),
            (Challenge::MemoryMatch(c), ChallengeInput::Tap(index)) => c.tap(index, now),
            (challenge, input) => {
                debug!(
                    alarm_id = %self.alarm.id,
                    kind = %challenge.kind(),
                    ?input,
                    "Input does not apply to current challenge"
                );
                return;
            }
        };

        if progress.is_solved() {
            self.orchestrator.report(ChallengeOutcome::Solved);
            self.present_current();
        }
        self.publish(|_| {});
    }

    fn tick(&mut self) {
        if let Some(challenge) = self.challenge.as_mut() {
            challenge.tick(Instant::now());
            self.publish(|_| {});
        }
    }

    fn snooze(&mut self) -> Result<Option<OffsetDateTime>, SessionError> {
        if self.shared.is_ended() {
            return Err(SessionError::Ended);
        }
        if !self.alarm.snooze_enabled() {
            return Err(SessionError::SnoozeDisabled);
        }

        self.shared.stop_sound();
        let until = self
            .ctx
            .scheduler
            .snooze(self.alarm.id, self.alarm.snooze_minutes);

        if !self.shared.end(SessionState::Snoozed { until }) {
            return Err(SessionError::Ended);
        }
        info!(alarm_id = %self.alarm.id, minutes = self.alarm.snooze_minutes, "Alarm snoozed");
        Ok(until)
    }

    fn dismiss(&mut self) -> Result<(), SessionError> {
        if self.shared.is_ended() {
            return Err(SessionError::Ended);
        }
        if !self.orchestrator.is_terminal() {
            return Err(SessionError::ChallengesPending {
                remaining: self.orchestrator.remaining(),
            });
        }
        if !self.shared.end(SessionState::Dismissed) {
            return Err(SessionError::Ended);
        }
        info!(alarm_id = %self.alarm.id, "Alarm dismissed");
        Ok(())
    }

    /// Start a fresh instance of the orchestrator's current challenge.
    ///
    /// A walk challenge counts from the session's first step reading and
    /// advances straight away if enough steps were already taken.
    fn present_current(&mut self) {
        loop {
            let mut challenge = self.orchestrator.current().and_then(|kind| {
                Challenge::start(kind, &self.ctx.challenges, &mut self.rng, Instant::now())
            });
            let progress = match (challenge.as_mut(), self.step_readings) {
                (Some(Challenge::Steps(c)), Some((first, latest))) => c.resume_from(first, latest),
                _ => Progress::Pending,
            };
            self.challenge = challenge;

            if !progress.is_solved() {
                return;
            }
            self.orchestrator.report(ChallengeOutcome::Solved);
        }
    }

    fn publish(&self, update: impl FnOnce(&mut SessionSnapshot)) {
        self.shared.snapshot.send_if_modified(|s| {
            if s.state.is_ended() {
                return false;
            }
            s.challenge_index = self.orchestrator.index();
            s.challenge = self.challenge.as_ref().map(Challenge::view);
            s.can_dismiss = self.orchestrator.is_terminal();
            update(s);
            true
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running [`RingingSession`].
#[derive(Clone)]
pub struct SessionHandle {
    alarm_id: AlarmId,
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn alarm_id(&self) -> AlarmId {
        self.alarm_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.shared.is_ended()
    }

    /// Queue input for the current challenge. Never blocks.
    pub fn submit(&self, input: ChallengeInput) -> Result<(), SessionError> {
        self.send(Command::Input(input))
    }

    /// The user left the current challenge; it is presented again.
    pub fn abandon(&self) -> Result<(), SessionError> {
        self.send(Command::Abandon)
    }

    /// Snooze and end the session. Returns the re-armed instant, or `None`
    /// if no wake tier accepted it.
    pub async fn snooze(&self) -> Result<Option<OffsetDateTime>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snooze(tx))?;
        rx.await.map_err(|_| SessionError::Ended)?
    }

    /// Dismiss and end the session. Fails while challenges remain.
    pub async fn dismiss(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Dismiss(tx))?;
        rx.await.map_err(|_| SessionError::Ended)?
    }

    /// End the session now. All sound has stopped when this returns.
    pub fn abort(&self) {
        if self.shared.end(SessionState::Aborted) {
            info!(alarm_id = %self.alarm_id, "Ringing session aborted");
        }
    }

    /// Wait until the session ends and return its final state.
    pub async fn ended(&self) -> SessionState {
        let mut rx = self.snapshot_rx.clone();
        match rx.wait_for(|s| s.state.is_ended()).await {
            Ok(snapshot) => snapshot.state,
            Err(_) => SessionState::Aborted,
        }
    }

    fn send(&self, cmd: Command) -> Result<(), SessionError> {
        if self.is_ended() {
            return Err(SessionError::Ended);
        }
        self.cmd_tx.send(cmd).map_err(|_| SessionError::Ended)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("alarm_id", &self.alarm_id)
            .field("state", &self.snapshot_rx.borrow().state)
            .finish()
    }
}
