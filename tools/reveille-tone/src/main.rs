//! Render composed ringtones to WAV files.
//!
//! Takes a note sequence either inline or from an alarm store document and
//! writes the mixed result as 16-bit mono PCM:
//!
//! ```text
//! reveille-tone --sequence "SINE|440|0;SINE|554.37|0;SQUARE|659.25|250" -o chord.wav
//! reveille-tone --store alarms.json --ringtone 3 -o sunrise.wav
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use reveille::audio::render::rendered_duration_ms;
use reveille::audio::{ComposedRingtone, SynthConfig, Synthesizer, render_sequence};
use reveille::store::StoreDocument;

#[derive(Parser)]
#[command(name = "reveille-tone")]
#[command(about = "Render a composed ringtone to a WAV file")]
#[command(version)]
struct Cli {
    /// Note sequence, e.g. "SINE|440|0;SQUARE|660|250"
    #[arg(short, long, conflicts_with = "store", required_unless_present = "store")]
    sequence: Option<String>,

    /// Alarm store JSON to take the ringtone from
    #[arg(long, requires = "ringtone")]
    store: Option<PathBuf>,

    /// Ringtone id within --store
    #[arg(long)]
    ringtone: Option<u32>,

    /// Output WAV file
    #[arg(short, long, default_value = "ringtone.wav")]
    output: PathBuf,

    /// Length of each note in milliseconds
    #[arg(long, default_value_t = 500)]
    note_ms: u32,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,

    /// List the parsed notes
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let ringtone = match (&cli.sequence, &cli.store, cli.ringtone) {
        (Some(sequence), _, _) => ComposedRingtone::from_sequence(0, "inline", sequence),
        (None, Some(store), Some(id)) => load_ringtone(store, id)?,
        _ => bail!("Either --sequence or --store with --ringtone is required"),
    };

    if ringtone.is_empty() {
        bail!("No playable notes in \"{}\"", ringtone.name);
    }

    let notes = ringtone.sorted_notes();
    if cli.verbose {
        for note in &notes {
            println!(
                "{:>6} ms  {:<8} {:>9.2} Hz",
                note.offset_ms, note.instrument, note.frequency_hz
            );
        }
    }

    let synth = Synthesizer::new(SynthConfig {
        sample_rate: cli.sample_rate,
        ..SynthConfig::default()
    });
    let samples = render_sequence(&notes, &synth, cli.note_ms);
    debug!(samples = samples.len(), "Rendered sequence");

    write_wav(&samples, cli.sample_rate, &cli.output)?;
    info!(path = %cli.output.display(), "Wrote WAV file");

    println!(
        "{}: {} notes, {} ms -> {}",
        ringtone.name,
        notes.len(),
        rendered_duration_ms(&notes, cli.note_ms),
        cli.output.display()
    );
    Ok(())
}

fn load_ringtone(path: &Path, id: u32) -> Result<ComposedRingtone> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: StoreDocument =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))?;

    let stored = doc
        .ringtones
        .into_iter()
        .find(|r| r.id == id)
        .with_context(|| format!("No ringtone {id} in {}", path.display()))?;
    Ok(ComposedRingtone::from_sequence(stored.id, stored.name, &stored.sequence))
}

fn write_wav(samples: &[i16], sample_rate: u32, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
