//! Contracts for the platform pieces the microphone test talks to.
//!
//! The controller only ever sees these traits: a level push-stream, capture
//! start/stop, and an audio output that hands out playback contexts. Real
//! backends live in `local_capture` and `cpal_output`; tests use fakes.
//!
//! Everything here is `?Send`. A test runs on one cooperative task, and the
//! cpal streams behind the real backends cannot cross threads anyway.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Receives each level update. Called from whatever thread the backend delivers on.
pub type LevelCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Disposer for a level subscription.
///
/// `unsubscribe` runs the disposer at most once. Dropping a subscription that is
/// still live unsubscribes it.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Live microphone level, pushed while a capture is running.
#[async_trait(?Send)]
pub trait LevelStream {
    /// Register `callback` and return its disposer once the platform acknowledges it.
    async fn subscribe(&self, callback: LevelCallback) -> Result<Subscription>;
}

/// Start and stop the platform's test capture.
#[async_trait(?Send)]
pub trait CaptureControl {
    /// Begin capturing. `device_name` of `None` selects the default input device.
    async fn start_capture(&self, sensitivity: u8, device_name: Option<&str>) -> Result<()>;

    /// Stop capturing and hand back everything recorded, as 16 kHz mono PCM.
    async fn stop_capture(&self) -> Result<Vec<i16>>;
}

/// A single-channel buffer of normalized samples ready to be played.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            bail!("Playback buffer sample rate must be non-zero");
        }
        if samples.is_empty() {
            bail!("Playback buffer must contain at least one sample");
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// An open handle to the host's audio output.
///
/// A fresh context may start suspended; nothing is heard until `resume` succeeds.
pub trait PlaybackContext {
    /// Native output rate in Hz.
    fn sample_rate(&self) -> u32;

    fn is_suspended(&self) -> bool;

    fn resume(&mut self) -> Result<()>;

    fn create_buffer(&self, samples: Vec<f32>, sample_rate: u32) -> Result<PlaybackBuffer> {
        PlaybackBuffer::mono(samples, sample_rate)
    }

    /// Schedule `buffer` on the default output device right away. Returns without
    /// waiting for playback to finish.
    fn play(&mut self, buffer: PlaybackBuffer) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Factory for playback contexts.
pub trait AudioOutput {
    fn create_context(&self) -> Result<Box<dyn PlaybackContext>>;
}
