//! Command-line interface for the reveille alarm engine.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use reveille::announce::LogAnnouncer;
use reveille::audio::{NullBackend, RingtoneSequencer};
use reveille::config::EngineConfig;
use reveille::store::{AlarmStore, MemoryStore};
use reveille::trigger::{describe_until, next_trigger};
use reveille::types::{AlarmTime, RepeatDays};
use reveille::wake::{Clock, SystemClock, TimerQueue, WakeScheduler};
use reveille::AlarmEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: reveille-cli <command> [args]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  next HH:MM [DAYS]   Show when an alarm would fire next");
        eprintln!("                      DAYS: Mon,Wed,Fri | weekdays | weekend | daily");
        eprintln!("  parse SEQUENCE      Parse a note sequence (INSTRUMENT|Hz|ms;...)");
        eprintln!("  alarms FILE         List alarms in a store file with their next fire");
        eprintln!("  watch FILE          Arm alarms from a store file and ring until Ctrl-C");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  REVEILLE_EXACT_ALARMS   Whether exact wake-ups are permitted (default: 1)");
        eprintln!("  REVEILLE_NOTE_MS        Note length in ms (default: 500)");
        eprintln!("  REVEILLE_LOOP_GAP_MS    Gap between ringtone loops in ms (default: 2000)");
        std::process::exit(1);
    }

    let command = &args[1];
    let rest = &args[2..];

    match command.as_str() {
        "next" => cmd_next(rest)?,
        "parse" => cmd_parse(rest)?,
        "alarms" => cmd_alarms(rest).await?,
        "watch" => cmd_watch(rest).await?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn cmd_next(args: &[String]) -> Result<()> {
    let Some(time) = args.first() else {
        bail!("Usage: reveille-cli next HH:MM [DAYS]");
    };
    let at = AlarmTime::parse(time).with_context(|| format!("Invalid time: {time}"))?;
    let days = match args.get(1) {
        Some(list) => {
            RepeatDays::parse_list(list).with_context(|| format!("Invalid day list: {list}"))?
        }
        None => RepeatDays::empty(),
    };

    let now = SystemClock.now();
    let trigger = next_trigger(at, days, now);

    println!("Alarm:  {} ({})", at, days);
    println!("Fires:  {}", trigger);
    println!("        {}", describe_until(now, trigger));
    Ok(())
}

fn cmd_parse(args: &[String]) -> Result<()> {
    let sequence = args.join(" ");
    let events = RingtoneSequencer::parse(&sequence);

    if events.is_empty() {
        println!("No playable notes; the default tone would play.");
        return Ok(());
    }

    println!("{} note(s):", events.len());
    for event in &events {
        println!(
            "  {:>6} ms  {:<8} {:>9.2} Hz",
            event.offset_ms, event.instrument, event.frequency_hz
        );
    }
    Ok(())
}

async fn cmd_alarms(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("Usage: reveille-cli alarms FILE");
    };
    let store = MemoryStore::load(path)
        .await
        .with_context(|| format!("Failed to load {path}"))?;

    let now = SystemClock.now();
    let alarms = store.alarms().await?;
    if alarms.is_empty() {
        println!("No alarms.");
        return Ok(());
    }

    for alarm in alarms {
        let status = if !alarm.active {
            "off".to_string()
        } else {
            match alarm.time() {
                Ok(at) => describe_until(now, next_trigger(at, alarm.repeat_days, now)),
                Err(e) => format!("invalid: {e}"),
            }
        };
        println!(
            "{:>4}  {:02}:{:02}  {:<20} {:<16} {}",
            alarm.id.0,
            alarm.hour,
            alarm.minute,
            alarm.repeat_days.to_string(),
            status,
            alarm.label
        );
    }
    Ok(())
}

async fn cmd_watch(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("Usage: reveille-cli watch FILE");
    };

    reveille::tracing::init_journald_or_stdout();

    let config = EngineConfig::from_env()?;
    let store = MemoryStore::load(path)
        .await
        .with_context(|| format!("Failed to load {path}"))?;

    let shutdown = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (queue, events) =
        TimerQueue::new(config.wake.exact_permitted, clock.clone(), shutdown.clone());
    let scheduler = Arc::new(WakeScheduler::new(Arc::new(queue), clock));

    let engine = AlarmEngine::new(
        &config,
        Arc::new(store),
        scheduler,
        Arc::new(NullBackend),
        Arc::new(LogAnnouncer),
    );
    engine.arm_all().await?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    engine.run(events, shutdown).await;
    Ok(())
}
