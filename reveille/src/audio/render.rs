//! Offline rendering of a note list into a single buffer.

use super::note::NoteEvent;
use super::synth::Synthesizer;

/// Mix `events` into one mono buffer.
///
/// Each note lasts `note_duration_ms` from its offset. Overlapping notes are
/// summed and the result clipped to the 16-bit range. The buffer ends when
/// the last note does.
pub fn render_sequence(
    events: &[NoteEvent],
    synth: &Synthesizer,
    note_duration_ms: u32,
) -> Vec<i16> {
    let note_len = synth.sample_count(note_duration_ms);
    let start_of = |event: &NoteEvent| {
        (event.offset_ms as f64 * f64::from(synth.sample_rate()) / 1000.0).round() as usize
    };

    let total = events
        .iter()
        .map(|e| start_of(e) + note_len)
        .max()
        .unwrap_or(0);

    let mut mix = vec![0i32; total];
    for event in events {
        let start = start_of(event);
        let samples = synth.generate(event.frequency_hz, note_duration_ms, event.instrument);
        for (slot, sample) in mix[start..].iter_mut().zip(samples) {
            *slot += i32::from(sample);
        }
    }

    mix.into_iter()
        .map(|s| s.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)
        .collect()
}

/// Length of the rendered buffer in milliseconds.
pub fn rendered_duration_ms(events: &[NoteEvent], note_duration_ms: u32) -> u64 {
    events
        .iter()
        .map(|e| e.offset_ms + u64::from(note_duration_ms))
        .max()
        .unwrap_or(0)
}
