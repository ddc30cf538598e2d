//! The alarm engine.
//!
//! Ties the store, the wake scheduler and ringing sessions together. The
//! engine arms alarms from the store, consumes [`WakeEvent`]s and starts a
//! [`RingingSession`] for each fire, announcing it exactly once. Repeating
//! alarms are re-armed for their next occurrence as they fire.
//!
//! At most one session is live per alarm. A fire for an alarm that is
//! still ringing aborts the old session before the new one starts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::announce::Announcer;
use crate::audio::{AudioBackend, RingtoneSequencer, Synthesizer};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::session::{Ringtone, RingingSession, SessionContext, SessionHandle, SessionState};
use crate::store::AlarmStore;
use crate::tracing::prelude::*;
use crate::types::{AlarmId, AlarmSpec, RingtoneRef};
use crate::wake::{WakeEvent, WakeScheduler};

pub struct AlarmEngine {
    store: Arc<dyn AlarmStore>,
    scheduler: Arc<WakeScheduler>,
    announcer: Arc<dyn Announcer>,
    ctx: SessionContext,
    sessions: Mutex<HashMap<AlarmId, SessionHandle>>,
}

impl AlarmEngine {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn AlarmStore>,
        scheduler: Arc<WakeScheduler>,
        audio: Arc<dyn AudioBackend>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        let sequencer = RingtoneSequencer::new(Synthesizer::new(config.synth), config.sequencer);
        let ctx = SessionContext {
            sequencer: Arc::new(sequencer),
            scheduler: scheduler.clone(),
            audio,
            challenges: config.challenges.clone(),
        };
        Self {
            store,
            scheduler,
            announcer,
            ctx,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn scheduler(&self) -> &Arc<WakeScheduler> {
        &self.scheduler
    }

    /// Arm every active alarm in the store. Returns how many were armed.
    ///
    /// Alarms with invalid times are logged and skipped.
    pub async fn arm_all(&self) -> Result<usize> {
        let mut armed = 0;
        for alarm in self.store.alarms().await? {
            if !alarm.active {
                continue;
            }
            match self.arm_spec(&alarm) {
                Ok(Some(_)) => armed += 1,
                Ok(None) => {}
                Err(e) => warn!(alarm_id = %alarm.id, error = %e, "Skipping alarm"),
            }
        }
        info!(armed, "Alarms armed");
        Ok(armed)
    }

    /// Arm the alarm `id` as currently stored. Inactive alarms are
    /// disarmed instead.
    pub async fn arm(&self, id: AlarmId) -> Result<Option<OffsetDateTime>> {
        let alarm = self.store.alarm(id).await?.ok_or(Error::AlarmNotFound(id))?;
        if !alarm.active {
            self.disarm(id);
            return Ok(None);
        }
        self.arm_spec(&alarm)
    }

    /// Arm `alarm` for its next trigger. `None` if no wake tier accepted it.
    pub fn arm_spec(&self, alarm: &AlarmSpec) -> Result<Option<OffsetDateTime>> {
        self.scheduler
            .arm(alarm)
            .map_err(|source| Error::InvalidAlarm {
                id: alarm.id,
                source,
            })
    }

    pub fn disarm(&self, id: AlarmId) {
        self.scheduler.cancel(id);
    }

    /// The live session for `id`, if any.
    pub fn session(&self, id: AlarmId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock();
        let handle = sessions.get(&id)?.clone();
        if handle.is_ended() {
            sessions.remove(&id);
            return None;
        }
        Some(handle)
    }

    pub fn live_sessions(&self) -> usize {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, handle| !handle.is_ended());
        sessions.len()
    }

    /// Handle a delivered wake-up.
    ///
    /// Returns the new session, or `None` if the alarm no longer exists or
    /// is inactive.
    pub async fn on_wake(&self, event: WakeEvent) -> Result<Option<SessionHandle>> {
        let id = event.alarm_id;
        self.scheduler.mark_fired(id, event.scheduled_for);
        info!(
            alarm_id = %id,
            scheduled_for = %event.scheduled_for,
            mode = %event.mode,
            "Alarm fired"
        );

        let Some(alarm) = self.store.alarm(id).await? else {
            warn!(alarm_id = %id, "Fired alarm no longer in store");
            return Ok(None);
        };
        if !alarm.active {
            debug!(alarm_id = %id, "Fired alarm is inactive, ignoring");
            return Ok(None);
        }

        if alarm.is_repeating() {
            self.rearm_after(&alarm, event.scheduled_for);
        }

        let handle = self.start_session(&alarm).await;
        self.announcer.announce_ringing(&alarm);
        self.withdraw_when_done(&handle);
        Ok(Some(handle))
    }

    /// Re-enter the ringing state for `id` after a restart, without a
    /// second announcement. Returns the live session if there is one.
    pub async fn present(&self, id: AlarmId) -> Result<SessionHandle> {
        if let Some(handle) = self.session(id) {
            return Ok(handle);
        }
        let alarm = self.store.alarm(id).await?.ok_or(Error::AlarmNotFound(id))?;
        info!(alarm_id = %id, "Re-entering ringing state");
        let handle = self.start_session(&alarm).await;
        self.withdraw_when_done(&handle);
        Ok(handle)
    }

    /// Consume wake events until `shutdown` is cancelled, then abort all
    /// live sessions.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<WakeEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.on_wake(event).await {
                            error!(
                                alarm_id = %event.alarm_id,
                                error = %e,
                                "Failed to handle wake-up"
                            );
                        }
                    }
                    None => {
                        debug!("Wake event channel closed");
                        break;
                    }
                },
            }
        }

        let sessions: Vec<SessionHandle> =
            self.sessions.lock().drain().map(|(_, handle)| handle).collect();
        for handle in sessions {
            handle.abort();
        }
        info!("Alarm engine stopped");
    }

    /// Arm the next occurrence of a repeating alarm that just fired.
    fn rearm_after(&self, alarm: &AlarmSpec, fired_for: OffsetDateTime) {
        let time = match alarm.time() {
            Ok(time) => time,
            Err(e) => {
                warn!(alarm_id = %alarm.id, error = %e, "Cannot re-arm alarm");
                return;
            }
        };
        // An inexact wake may arrive before its instant; never re-arm at or
        // before the occurrence that just fired.
        let from = self.scheduler.clock().now().max(fired_for);
        let next = self.scheduler.next_trigger(time, alarm.repeat_days, from);
        self.scheduler.schedule(alarm.id, next);
    }

    async fn start_session(&self, alarm: &AlarmSpec) -> SessionHandle {
        let ringtone = self.ringtone_for(alarm).await;

        let mut sessions = self.sessions.lock();
        if let Some(stale) = sessions.remove(&alarm.id) {
            if !stale.is_ended() {
                info!(alarm_id = %alarm.id, "Superseding live session");
                stale.abort();
            }
        }
        let handle = RingingSession::start(alarm, ringtone, &self.ctx);
        sessions.insert(alarm.id, handle.clone());
        handle
    }

    async fn ringtone_for(&self, alarm: &AlarmSpec) -> Ringtone {
        match &alarm.ringtone {
            RingtoneRef::Default => Ringtone::Default,
            RingtoneRef::DeviceSound(uri) => Ringtone::Device(uri.clone()),
            RingtoneRef::Composed(ringtone_id) => match self.store.ringtone(*ringtone_id).await {
                Ok(Some(ringtone)) => Ringtone::Composed(ringtone.notes),
                Ok(None) => {
                    warn!(
                        alarm_id = %alarm.id,
                        ringtone_id,
                        "Ringtone missing, using default tone"
                    );
                    Ringtone::Default
                }
                Err(e) => {
                    warn!(
                        alarm_id = %alarm.id,
                        ringtone_id,
                        error = %e,
                        "Failed to load ringtone, using default tone"
                    );
                    Ringtone::Default
                }
            },
        }
    }

    /// Withdraw the announcement once the session is snoozed or dismissed.
    /// Aborted sessions keep it so a restart can re-enter them.
    fn withdraw_when_done(&self, handle: &SessionHandle) {
        let id = handle.alarm_id();
        let announcer = self.announcer.clone();
        let mut rx = handle.subscribe();
        tokio::spawn(async move {
            let state = match rx.wait_for(|s| s.state.is_ended()).await {
                Ok(snapshot) => snapshot.state,
                Err(_) => return,
            };
            if state != SessionState::Aborted {
                announcer.withdraw(id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::audio::ComposedRingtone;
    use crate::audio::session::testing::{Played, RecordingBackend};
    use crate::store::MemoryStore;
    use crate::types::RepeatDays;
    use crate::wake::WakeMode;
    use crate::wake::testing::{FakePrimitive, FixedClock};

    // A Monday.
    const NOW: OffsetDateTime = datetime!(2024-06-03 06:00 UTC);

    #[derive(Default)]
    struct CountingAnnouncer {
        announced: Mutex<Vec<AlarmId>>,
        withdrawn: Mutex<Vec<AlarmId>>,
    }

    impl Announcer for CountingAnnouncer {
        fn announce_ringing(&self, alarm: &AlarmSpec) {
            self.announced.lock().push(alarm.id);
        }

        fn withdraw(&self, id: AlarmId) {
            self.withdrawn.lock().push(id);
        }
    }

    struct Fixture {
        engine: AlarmEngine,
        store: Arc<MemoryStore>,
        primitive: Arc<FakePrimitive>,
        clock: Arc<FixedClock>,
        backend: Arc<RecordingBackend>,
        announcer: Arc<CountingAnnouncer>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let primitive = Arc::new(FakePrimitive::new(true));
        let clock = Arc::new(FixedClock::at(NOW));
        let backend = Arc::new(RecordingBackend::new());
        let announcer = Arc::new(CountingAnnouncer::default());
        let scheduler = Arc::new(WakeScheduler::new(primitive.clone(), clock.clone()));
        let engine = AlarmEngine::new(
            &EngineConfig::default(),
            store.clone(),
            scheduler,
            backend.clone(),
            announcer.clone(),
        );
        Fixture {
            engine,
            store,
            primitive,
            clock,
            backend,
            announcer,
        }
    }

    fn wake(id: u32, at: OffsetDateTime) -> WakeEvent {
        WakeEvent {
            alarm_id: AlarmId(id),
            scheduled_for: at,
            mode: WakeMode::ExactWhileIdle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn arm_all_skips_inactive_alarms() {
        let f = fixture();
        f.store.put_alarm(AlarmSpec::new(AlarmId(1), 7, 0));
        let mut inactive = AlarmSpec::new(AlarmId(2), 8, 0);
        inactive.active = false;
        f.store.put_alarm(inactive);
        f.store.put_alarm(AlarmSpec::new(AlarmId(3), 24, 0));

        assert_eq!(f.engine.arm_all().await.unwrap(), 1);
        assert_eq!(f.engine.scheduler().pending_count(), 1);
        assert!(f.primitive.live.lock().contains_key(&AlarmId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn arm_reports_missing_and_invalid_alarms() {
        let f = fixture();
        f.store.put_alarm(AlarmSpec::new(AlarmId(3), 7, 60));

        assert!(matches!(
            f.engine.arm(AlarmId(9)).await,
            Err(Error::AlarmNotFound(AlarmId(9)))
        ));
        assert!(matches!(
            f.engine.arm(AlarmId(3)).await,
            Err(Error::InvalidAlarm { id: AlarmId(3), .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fire_announces_once_and_rings() {
        let f = fixture();
        let mut alarm = AlarmSpec::new(AlarmId(1), 7, 0);
        alarm.ringtone = RingtoneRef::DeviceSound("content://chime".into());
        f.store.put_alarm(alarm);

        let at = f.engine.arm(AlarmId(1)).await.unwrap().unwrap();
        f.clock.set(at);
        let handle = f.engine.on_wake(wake(1, at)).await.unwrap().unwrap();

        assert_eq!(*f.announcer.announced.lock(), vec![AlarmId(1)]);
        assert!(f.backend.sink.contains(&Played::DeviceSound("content://chime".into())));
        assert_eq!(f.engine.scheduler().pending_count(), 0);
        assert_eq!(f.engine.live_sessions(), 1);

        handle.dismiss().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(*f.announcer.withdrawn.lock(), vec![AlarmId(1)]);
        assert_eq!(f.engine.live_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_alarm_rearms_next_occurrence() {
        let f = fixture();
        let mut alarm = AlarmSpec::new(AlarmId(1), 7, 0);
        alarm.repeat_days = RepeatDays::WEEKDAYS;
        f.store.put_alarm(alarm);

        let monday = datetime!(2024-06-03 07:00 UTC);
        f.clock.set(monday);
        f.engine.on_wake(wake(1, monday)).await.unwrap();

        let pending = f.engine.scheduler().pending(AlarmId(1)).unwrap();
        assert_eq!(pending.at, datetime!(2024-06-04 07:00 UTC));
    }

    #[tokio::test(start_paused = true)]
    async fn early_inexact_wake_does_not_rearm_same_occurrence() {
        let f = fixture();
        let mut alarm = AlarmSpec::new(AlarmId(1), 7, 0);
        alarm.repeat_days = RepeatDays::EVERY_DAY;
        f.store.put_alarm(alarm);

        f.clock.set(datetime!(2024-06-03 06:59:30 UTC));
        f.engine
            .on_wake(wake(1, datetime!(2024-06-03 07:00 UTC)))
            .await
            .unwrap();

        let pending = f.engine.scheduler().pending(AlarmId(1)).unwrap();
        assert_eq!(pending.at, datetime!(2024-06-04 07:00 UTC));
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_is_not_rearmed() {
        let f = fixture();
        f.store.put_alarm(AlarmSpec::new(AlarmId(1), 7, 0));

        f.engine
            .on_wake(wake(1, datetime!(2024-06-03 07:00 UTC)))
            .await
            .unwrap();

        assert_eq!(f.engine.scheduler().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_fire_supersedes_live_session() {
        let f = fixture();
        let mut alarm = AlarmSpec::new(AlarmId(1), 7, 0);
        alarm.challenges = vec!["WALK".into()];
        f.store.put_alarm(alarm);
        let at = datetime!(2024-06-03 07:00 UTC);

        let first = f.engine.on_wake(wake(1, at)).await.unwrap().unwrap();
        let second = f.engine.on_wake(wake(1, at)).await.unwrap().unwrap();

        assert_eq!(first.snapshot().state, SessionState::Aborted);
        assert_eq!(second.snapshot().state, SessionState::Presenting);
        assert_eq!(f.engine.live_sessions(), 1);
        assert_eq!(f.announcer.announced.lock().len(), 2);

        tokio::task::yield_now().await;
        assert!(f.announcer.withdrawn.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_or_deleted_alarm_does_not_ring() {
        let f = fixture();
        let mut alarm = AlarmSpec::new(AlarmId(1), 7, 0);
        alarm.active = false;
        f.store.put_alarm(alarm);
        let at = datetime!(2024-06-03 07:00 UTC);

        assert!(f.engine.on_wake(wake(1, at)).await.unwrap().is_none());
        assert!(f.engine.on_wake(wake(2, at)).await.unwrap().is_none());
        assert!(f.announcer.announced.lock().is_empty());
        assert!(f.backend.sink.log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ringtone_falls_back_to_default_tone() {
        let f = fixture();
        let mut alarm = AlarmSpec::new(AlarmId(1), 7, 0);
        alarm.ringtone = RingtoneRef::Composed(99);
        f.store.put_alarm(alarm);

        f.engine
            .on_wake(wake(1, datetime!(2024-06-03 07:00 UTC)))
            .await
            .unwrap();

        assert!(f.backend.sink.contains(&Played::DefaultTone));
    }

    #[tokio::test(start_paused = true)]
    async fn composed_ringtone_plays_notes() {
        let f = fixture();
        f.store
            .put_ringtone(ComposedRingtone::from_sequence(4, "Chime", "SINE|880|0;SINE|660|0"));
        let mut alarm = AlarmSpec::new(AlarmId(1), 7, 0);
        alarm.ringtone = RingtoneRef::Composed(4);
        f.store.put_alarm(alarm);

        f.engine
            .on_wake(wake(1, datetime!(2024-06-03 07:00 UTC)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.backend.sink.pcm_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn present_reenters_without_announcing() {
        let f = fixture();
        f.store.put_alarm(AlarmSpec::new(AlarmId(1), 7, 0));

        let handle = f.engine.present(AlarmId(1)).await.unwrap();
        let again = f.engine.present(AlarmId(1)).await.unwrap();

        assert_eq!(handle.snapshot().state, SessionState::Presenting);
        assert_eq!(again.snapshot().started_at, handle.snapshot().started_at);
        assert_eq!(f.engine.live_sessions(), 1);
        assert!(f.announcer.announced.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_handles_events_and_aborts_on_shutdown() {
        let f = fixture();
        f.store.put_alarm(AlarmSpec::new(AlarmId(1), 7, 0));
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tx.send(wake(1, datetime!(2024-06-03 07:00 UTC))).unwrap();
        let engine = Arc::new(f.engine);
        let runner = {
            let engine = engine.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { engine.run(rx, shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let handle = engine.session(AlarmId(1)).unwrap();

        shutdown.cancel();
        runner.await.unwrap();

        assert_eq!(handle.snapshot().state, SessionState::Aborted);
        assert_eq!(engine.live_sessions(), 0);
    }
}
