//! Tone synthesis, composed ringtones and playback.

pub mod note;
pub mod render;
pub mod sequencer;
pub mod session;
pub mod synth;

pub use note::{ComposedRingtone, MAX_DURATION_MS, NoteEvent, parse_sequence, serialize_sequence};
pub use render::render_sequence;
pub use sequencer::{
    PlaybackHandle, PlaybackMode, PlaybackSource, RingtoneSequencer, SequencerConfig,
};
pub use session::{AudioBackend, AudioError, AudioSession, AudioSink, NullBackend};
pub use synth::{SynthConfig, Synthesizer, Waveform};
