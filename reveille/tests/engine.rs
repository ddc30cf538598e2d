//! End-to-end: store, timer queue, engine and ringing sessions on a paused
//! tokio clock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use reveille::announce::Announcer;
use reveille::audio::{AudioBackend, AudioError, AudioSink, ComposedRingtone};
use reveille::challenge::ChallengeView;
use reveille::config::EngineConfig;
use reveille::session::{ChallengeInput, SessionError, SessionState};
use reveille::store::MemoryStore;
use reveille::types::{AlarmId, AlarmSpec, RepeatDays, RingtoneRef};
use reveille::wake::{Clock, TimerQueue, WakeScheduler};
use reveille::AlarmEngine;

/// Wall clock that follows tokio's (paused) time.
struct TokioClock {
    base: OffsetDateTime,
    start: Instant,
}

impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        self.base + self.start.elapsed()
    }
}

#[derive(Default)]
struct Sink {
    notes: Mutex<usize>,
    stops: Mutex<usize>,
}

impl AudioSink for Sink {
    fn play_pcm(&self, _samples: Arc<[i16]>, _sample_rate: u32) -> Result<(), AudioError> {
        *self.notes.lock() += 1;
        Ok(())
    }

    fn play_default_tone(&self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play_device_sound(&self, _uri: &str) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&self) {
        *self.stops.lock() += 1;
    }
}

struct Backend(Arc<Sink>);

impl AudioBackend for Backend {
    fn open(&self) -> Result<Arc<dyn AudioSink>, AudioError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct Announcements(Mutex<Vec<AlarmId>>);

impl Announcer for Announcements {
    fn announce_ringing(&self, alarm: &AlarmSpec) {
        self.0.lock().push(alarm.id);
    }

    fn withdraw(&self, _id: AlarmId) {}
}

async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[tokio::test(start_paused = true)]
async fn weekday_alarm_rings_snoozes_and_is_dismissed() {
    // Monday, one minute before the alarm.
    let clock: Arc<dyn Clock> = Arc::new(TokioClock {
        base: datetime!(2024-06-03 06:59 UTC),
        start: Instant::now(),
    });

    let store = Arc::new(MemoryStore::new());
    store.put_ringtone(ComposedRingtone::from_sequence(
        1,
        "Rise",
        "SINE|440|0;SINE|554.37|0;TRIANGLE|659.25|300",
    ));
    let mut alarm = AlarmSpec::new(AlarmId(10), 7, 0);
    alarm.repeat_days = RepeatDays::WEEKDAYS;
    alarm.ringtone = RingtoneRef::Composed(1);
    alarm.snooze_minutes = 5;
    alarm.challenges = vec!["math problem".into(), "NOT A REAL CHALLENGE".into()];
    store.put_alarm(alarm);

    let shutdown = CancellationToken::new();
    let (queue, events) = TimerQueue::new(false, clock.clone(), shutdown.clone());
    let scheduler = Arc::new(WakeScheduler::new(Arc::new(queue), clock.clone()));
    let sink = Arc::new(Sink::default());
    let announcer = Arc::new(Announcements::default());

    let engine = Arc::new(AlarmEngine::new(
        &EngineConfig::default(),
        store,
        scheduler.clone(),
        Arc::new(Backend(sink.clone())),
        announcer.clone(),
    ));

    assert_eq!(engine.arm_all().await.unwrap(), 1);
    let runner = {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { engine.run(events, shutdown).await })
    };

    // Fires at 07:00 and arms Tuesday right away.
    sleep(Duration::from_secs(61)).await;
    let session = engine.session(AlarmId(10)).expect("alarm should be ringing");
    assert_eq!(*announcer.0.lock(), vec![AlarmId(10)]);
    assert_eq!(
        scheduler.pending(AlarmId(10)).map(|r| r.at),
        Some(datetime!(2024-06-04 07:00 UTC))
    );
    assert_eq!(*sink.notes.lock(), 3);

    assert_eq!(
        session.dismiss().await,
        Err(SessionError::ChallengesPending { remaining: 2 })
    );

    // Snooze replaces Tuesday's registration with one five minutes out.
    let until = session.snooze().await.unwrap();
    assert!(until.is_some());
    assert_eq!(scheduler.pending(AlarmId(10)).map(|r| r.at), until);
    assert!(*sink.stops.lock() > 0);
    let notes_at_snooze = *sink.notes.lock();

    sleep(Duration::from_secs(4 * 60)).await;
    assert_eq!(*sink.notes.lock(), notes_at_snooze);
    assert!(engine.session(AlarmId(10)).is_none());

    // Snooze fires; Tuesday is armed again.
    sleep(Duration::from_secs(61)).await;
    let session = engine.session(AlarmId(10)).expect("snoozed alarm should ring");
    assert_eq!(announcer.0.lock().len(), 2);
    assert_eq!(
        scheduler.pending(AlarmId(10)).map(|r| r.at),
        Some(datetime!(2024-06-04 07:00 UTC))
    );

    let answer = match session.snapshot().challenge {
        Some(ChallengeView::Arithmetic { left, right, .. }) => left + right,
        other => panic!("expected arithmetic, got {other:?}"),
    };
    session.submit(ChallengeInput::Answer(answer.to_string())).unwrap();
    session.dismiss().await.unwrap();

    assert_eq!(session.ended().await, SessionState::Dismissed);
    assert_eq!(engine.live_sessions(), 0);

    shutdown.cancel();
    runner.await.unwrap();
}
