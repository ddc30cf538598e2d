//! Composed ringtones and their note-sequence text format.
//!
//! A sequence is a list of events joined by `;`, each event being
//! `INSTRUMENT|frequency|offsetMs`:
//!
//! ```text
//! SINE|440|0;SINE|554.37|0;SQUARE|659.25|250
//! ```
//!
//! Parsing is lenient. A record that does not have exactly three fields,
//! whose numbers do not parse, or whose instrument is unknown is dropped
//! and the rest of the sequence is kept.

use serde::{Deserialize, Serialize};

use super::synth::Waveform;
use crate::tracing::prelude::*;

/// Longest offset a composed ringtone may place a note at.
pub const MAX_DURATION_MS: u64 = 10_000;

/// One note in a composed ringtone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub instrument: Waveform,
    pub frequency_hz: f64,
    /// Milliseconds from the start of the sequence.
    pub offset_ms: u64,
}

impl NoteEvent {
    pub fn new(instrument: Waveform, frequency_hz: f64, offset_ms: u64) -> Self {
        Self {
            instrument,
            frequency_hz,
            offset_ms,
        }
    }

    fn parse_record(record: &str) -> Option<Self> {
        let fields: Vec<&str> = record.split('|').map(str::trim).collect();
        let [instrument, frequency, offset] = fields.as_slice() else {
            return None;
        };

        let instrument = instrument.parse::<Waveform>().ok()?;
        let frequency_hz = frequency.parse::<f64>().ok()?;
        let offset_ms = offset.parse::<u64>().ok()?;

        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return None;
        }

        Some(Self::new(instrument, frequency_hz, offset_ms))
    }
}

/// Parse a note sequence, dropping malformed records.
///
/// Returns events in input order. An empty result means the caller should
/// play the default tone instead.
pub fn parse_sequence(sequence: &str) -> Vec<NoteEvent> {
    sequence
        .split(';')
        .filter_map(|record| {
            let event = NoteEvent::parse_record(record);
            if event.is_none() && !record.trim().is_empty() {
                debug!(record, "Dropping malformed note record");
            }
            event
        })
        .collect()
}

/// Render events back into the sequence text format.
pub fn serialize_sequence(events: &[NoteEvent]) -> String {
    events
        .iter()
        .map(|e| format!("{}|{}|{}", e.instrument, e.frequency_hz, e.offset_ms))
        .collect::<Vec<_>>()
        .join(";")
}

/// A user-authored ringtone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedRingtone {
    pub id: u32,
    pub name: String,
    pub notes: Vec<NoteEvent>,
}

impl ComposedRingtone {
    /// Build a ringtone from its persisted sequence text.
    ///
    /// Notes placed past [`MAX_DURATION_MS`] are dropped along with
    /// malformed records.
    pub fn from_sequence(id: u32, name: impl Into<String>, sequence: &str) -> Self {
        let notes = parse_sequence(sequence)
            .into_iter()
            .filter(|note| {
                let in_range = note.offset_ms <= MAX_DURATION_MS;
                if !in_range {
                    debug!(offset_ms = note.offset_ms, "Dropping note past ringtone end");
                }
                in_range
            })
            .collect();
        Self {
            id,
            name: name.into(),
            notes,
        }
    }

    pub fn sequence(&self) -> String {
        serialize_sequence(&self.notes)
    }

    /// Notes sorted by start offset. Notes sharing an offset keep their
    /// relative order.
    pub fn sorted_notes(&self) -> Vec<NoteEvent> {
        let mut notes = self.notes.clone();
        notes.sort_by_key(|n| n.offset_ms);
        notes
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn drops_malformed_second_record() {
        let events = parse_sequence("SINE|440|0;SQUARE|550|abc");
        assert_eq!(events, vec![NoteEvent::new(Waveform::Sine, 440.0, 0)]);
    }

    #[test_case(""; "empty")]
    #[test_case(";;"; "only separators")]
    #[test_case("SINE|440"; "two fields")]
    #[test_case("SINE|440|0|9"; "four fields")]
    #[test_case("FLUTE|440|0"; "unknown instrument")]
    #[test_case("SINE|loud|0"; "bad frequency")]
    #[test_case("SINE|440|-5"; "negative offset")]
    #[test_case("SINE|0|0"; "zero frequency")]
    #[test_case("SINE|-440|0"; "negative frequency")]
    #[test_case("SINE|NaN|0"; "nan frequency")]
    fn malformed_input_parses_to_nothing(input: &str) {
        assert!(parse_sequence(input).is_empty());
    }

    #[test]
    fn keeps_chords_and_order() {
        let events = parse_sequence("TRIANGLE|659.25|500;SINE|440|0;SINE|554.37|0");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].offset_ms, 500);
        assert_eq!(events[1].instrument, Waveform::Sine);
        assert_eq!(events[2].frequency_hz, 554.37);
    }

    #[test]
    fn tolerates_whitespace_around_fields() {
        let events = parse_sequence(" SAWTOOTH | 220.5 | 125 ; ");
        assert_eq!(events, vec![NoteEvent::new(Waveform::Sawtooth, 220.5, 125)]);
    }

    #[test]
    fn serializes_in_wire_format() {
        let events = vec![
            NoteEvent::new(Waveform::Sine, 440.0, 0),
            NoteEvent::new(Waveform::Square, 554.37, 250),
        ];
        let text = serialize_sequence(&events);
        assert_eq!(text, "SINE|440|0;SQUARE|554.37|250");
        assert_eq!(parse_sequence(&text), events);
    }

    #[test]
    fn ringtone_drops_notes_past_end_and_sorts() {
        let ringtone =
            ComposedRingtone::from_sequence(1, "Morning", "SINE|880|900;SINE|440|0;SINE|220|10001");
        assert_eq!(ringtone.notes.len(), 2);

        let sorted = ringtone.sorted_notes();
        assert_eq!(sorted[0].offset_ms, 0);
        assert_eq!(sorted[1].offset_ms, 900);
    }
}
