//! Scoped access to the audio output.
//!
//! An [`AudioSession`] is acquired from an [`AudioBackend`] when an alarm
//! starts ringing and released when it stops, either explicitly or when
//! the last clone is dropped. If the device cannot be opened the session
//! is silent: every play call becomes a no-op and ringing continues.
//!
//! Once [`AudioSession::release`] returns, no further sound is started
//! through the session.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::tracing::prelude::*;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

/// An opened audio output.
///
/// Play calls start sound and return without waiting for it to finish;
/// overlapping buffers are mixed by the sink.
pub trait AudioSink: Send + Sync {
    /// Play a mono 16-bit buffer once.
    fn play_pcm(&self, samples: Arc<[i16]>, sample_rate: u32) -> Result<(), AudioError>;

    /// Loop the platform's default alert tone until stopped.
    fn play_default_tone(&self) -> Result<(), AudioError>;

    /// Loop a device-provided sound until stopped.
    fn play_device_sound(&self, uri: &str) -> Result<(), AudioError>;

    /// Silence everything currently playing.
    fn stop(&self);
}

/// Opens audio sinks.
pub trait AudioBackend: Send + Sync {
    fn open(&self) -> Result<Arc<dyn AudioSink>, AudioError>;
}

/// Backend for hosts without audio output. Sessions acquired from it
/// accept every call and play nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

struct NullSink;

impl AudioSink for NullSink {
    fn play_pcm(&self, _samples: Arc<[i16]>, _sample_rate: u32) -> Result<(), AudioError> {
        Ok(())
    }

    fn play_default_tone(&self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play_device_sound(&self, _uri: &str) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&self) {}
}

impl AudioBackend for NullBackend {
    fn open(&self) -> Result<Arc<dyn AudioSink>, AudioError> {
        Ok(Arc::new(NullSink))
    }
}

struct Inner {
    sink: Option<Arc<dyn AudioSink>>,
    released: Mutex<bool>,
}

impl Inner {
    fn with_sink(
        &self,
        what: &str,
        play: impl FnOnce(&dyn AudioSink) -> Result<(), AudioError>,
    ) -> bool {
        let released = self.released.lock();
        if *released {
            return false;
        }
        let Some(sink) = &self.sink else {
            return false;
        };
        match play(sink.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to play {what}");
                false
            }
        }
    }

    fn release(&self) {
        let mut released = self.released.lock();
        if *released {
            return;
        }
        *released = true;
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        debug!("Audio session released");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.release();
    }
}

/// Cloneable handle to one acquisition of the audio output.
#[derive(Clone)]
pub struct AudioSession {
    inner: Arc<Inner>,
}

impl AudioSession {
    /// Open the output, degrading to a silent session on failure.
    pub fn acquire(backend: &dyn AudioBackend) -> Self {
        let sink = match backend.open() {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(error = %e, "Audio unavailable, ringing silently");
                None
            }
        };
        Self::from_sink(sink)
    }

    /// A session that never makes sound.
    pub fn silent() -> Self {
        Self::from_sink(None)
    }

    fn from_sink(sink: Option<Arc<dyn AudioSink>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                released: Mutex::new(false),
            }),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.inner.sink.is_none()
    }

    pub fn is_released(&self) -> bool {
        *self.inner.released.lock()
    }

    /// Returns whether the buffer was handed to the sink.
    pub fn play_pcm(&self, samples: Arc<[i16]>, sample_rate: u32) -> bool {
        self.inner
            .with_sink("note", |sink| sink.play_pcm(samples, sample_rate))
    }

    pub fn play_default_tone(&self) -> bool {
        self.inner
            .with_sink("default tone", |sink| sink.play_default_tone())
    }

    pub fn play_device_sound(&self, uri: &str) -> bool {
        self.inner
            .with_sink("device sound", |sink| sink.play_device_sound(uri))
    }

    /// Silence current sound but keep the session usable.
    pub fn stop(&self) {
        let released = self.inner.released.lock();
        if !*released {
            if let Some(sink) = &self.inner.sink {
                sink.stop();
            }
        }
    }

    /// Stop all sound and refuse further play calls. Idempotent.
    pub fn release(&self) {
        self.inner.release();
    }
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("silent", &self.is_silent())
            .field("released", &self.is_released())
            .finish()
    }
}
