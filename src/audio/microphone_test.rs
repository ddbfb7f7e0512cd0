//! Microphone test session: record a short clip while showing the input level,
//! then play it back.
//!
//! All collaborators are injected via constructor. Failures never escape the
//! public operations; they end up in `last_error` and the test returns to idle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::bridge::{AudioOutput, CaptureControl, LevelCallback, LevelStream, Subscription};
use super::playback_context::{ContextState, PlaybackSlot};
use super::resampler::{resample_i16_to_f32, CAPTURE_SAMPLE_RATE};
use crate::error::MicTestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Testing,
}

impl TestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestPhase::Idle => "idle",
            TestPhase::Testing => "testing",
        }
    }
}

/// Snapshot of a test, readable at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct TestStatus {
    pub phase: TestPhase,
    pub level: f32,
    pub last_error: Option<String>,
}

impl TestStatus {
    /// A failed start or stop leaves the test idle with the error recorded.
    pub fn is_error(&self) -> bool {
        self.phase == TestPhase::Idle && self.last_error.is_some()
    }
}

/// Most recent level, shared with the stream callback.
#[derive(Clone, Default)]
struct LevelCell {
    bits: Arc<AtomicU32>,
}

impl LevelCell {
    fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn set(&self, level: f32) {
        self.bits.store(level.to_bits(), Ordering::Release);
    }
}

struct LevelListener {
    subscription: Subscription,
    live: Arc<AtomicBool>,
}

pub struct MicrophoneTest {
    levels: Arc<dyn LevelStream>,
    capture: Arc<dyn CaptureControl>,
    playback: PlaybackSlot,
    phase: TestPhase,
    level: LevelCell,
    last_error: Option<String>,
    listener: Option<LevelListener>,
    timeout: Option<Duration>,
}

impl MicrophoneTest {
    pub fn new(
        levels: Arc<dyn LevelStream>,
        capture: Arc<dyn CaptureControl>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        Self {
            levels,
            capture,
            playback: PlaybackSlot::new(output),
            phase: TestPhase::Idle,
            level: LevelCell::default(),
            last_error: None,
            listener: None,
            timeout: None,
        }
    }

    /// Bound every platform call (subscribe, start, stop) by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn status(&self) -> TestStatus {
        TestStatus {
            phase: self.phase,
            level: self.level(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    pub fn level(&self) -> f32 {
        self.level.get()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn playback_state(&self) -> &ContextState {
        self.playback.state()
    }

    /// Make sure the playback context exists and is running.
    ///
    /// Must be called synchronously from the user gesture that leads to
    /// playback (the click that starts the test), before anything is awaited.
    /// Safe to call repeatedly.
    pub fn prepare_playback(&mut self) {
        if let Err(e) = self.playback.ensure() {
            warn!("Playback is unavailable: {:#}", e);
        }
    }

    /// Subscribe to the level stream and ask the platform to start capturing.
    ///
    /// On failure the error is recorded, the subscription is released, and the
    /// test stays idle. Returns the resulting phase.
    pub async fn start(&mut self, sensitivity: u8, device_name: Option<&str>) -> TestPhase {
        self.last_error = None;
        self.level.set(0.0);

        match self.try_start(sensitivity, device_name).await {
            Ok(()) => {
                self.phase = TestPhase::Testing;
                info!(
                    "Microphone test started (sensitivity {}, device {})",
                    sensitivity,
                    device_name.unwrap_or("default")
                );
            }
            Err(e) => {
                error!("Microphone test failed to start: {}", e);
                self.last_error = Some(e.to_string());
                self.phase = TestPhase::Idle;
                self.cleanup();
                self.level.set(0.0);
            }
        }

        self.phase
    }

    async fn try_start(
        &mut self,
        sensitivity: u8,
        device_name: Option<&str>,
    ) -> Result<(), MicTestError> {
        self.cleanup();

        let live = Arc::new(AtomicBool::new(true));
        let callback: LevelCallback = {
            let level = self.level.clone();
            let live = Arc::clone(&live);
            Arc::new(move |value: f32| {
                if live.load(Ordering::Acquire) {
                    level.set(value);
                }
            })
        };

        let subscription = bounded(self.timeout, self.levels.subscribe(callback))
            .await
            .map_err(MicTestError::subscription)?;

        self.listener = Some(LevelListener { subscription, live });

        let started = bounded(
            self.timeout,
            self.capture.start_capture(sensitivity, device_name),
        )
        .await;

        if let Err(e) = started {
            // A start that outlives the timeout may still complete on the platform side.
            if is_timeout(&e) {
                warn!("Capture start timed out, asking the platform to stop");
                if let Err(stop_err) = bounded(self.timeout, self.capture.stop_capture()).await {
                    debug!("Stop after start timeout failed: {:#}", stop_err);
                }
            }
            return Err(MicTestError::capture_start(e));
        }

        Ok(())
    }

    /// Stop capturing and return what was recorded.
    ///
    /// Always ends idle with the listener released and the level at zero. If the
    /// platform call fails the error is recorded and the result is empty.
    pub async fn stop(&mut self) -> Vec<i16> {
        let result = bounded(self.timeout, self.capture.stop_capture())
            .await
            .map_err(MicTestError::capture_stop);

        self.phase = TestPhase::Idle;
        self.cleanup();
        self.level.set(0.0);

        match result {
            Ok(samples) => {
                info!("Microphone test stopped, {} samples captured", samples.len());
                samples
            }
            Err(e) => {
                error!("Microphone test failed to stop: {}", e);
                self.last_error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    /// Play captured 16 kHz samples on the playback context. Does nothing for an
    /// empty buffer. Playback is fire-and-forget; failures are only logged.
    pub fn play_audio(&mut self, samples: &[i16]) {
        if samples.is_empty() {
            debug!("Nothing to play back");
            return;
        }

        if let Err(e) = self.schedule_playback(samples) {
            warn!("{}", MicTestError::playback(e));
        }
    }

    fn schedule_playback(&mut self, samples: &[i16]) -> anyhow::Result<()> {
        let context = self.playback.ensure()?;
        let sample_rate = context.sample_rate();
        let channel_data = resample_i16_to_f32(samples, CAPTURE_SAMPLE_RATE, sample_rate);
        let buffer = context.create_buffer(channel_data, sample_rate)?;

        debug!(
            "Scheduling {:.2}s of playback at {} Hz",
            buffer.duration().as_secs_f32(),
            sample_rate
        );
        context.play(buffer)
    }

    /// Release the level subscription if there is one. Safe to call any number
    /// of times from any phase.
    pub fn cleanup(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.live.store(false, Ordering::Release);
            listener.subscription.unsubscribe();
            debug!("Level subscription released");
        }
    }

    /// Tear the session down: release the subscription and close the playback
    /// context. Also runs on drop.
    pub fn dispose(&mut self) {
        self.cleanup();
        self.playback.close();
    }
}

impl Drop for MicrophoneTest {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Run a platform call, failing with [`MicTestError::Timeout`] once `timeout` elapses.
async fn bounded<T, F>(timeout: Option<Duration>, call: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(MicTestError::Timeout(limit.as_millis()).into()),
        },
        None => call.await,
    }
}

fn is_timeout(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<MicTestError>(),
        Some(MicTestError::Timeout(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_as_str() {
        assert_eq!(TestPhase::Idle.as_str(), "idle");
        assert_eq!(TestPhase::Testing.as_str(), "testing");
    }

    #[test]
    fn test_status_is_error() {
        let status = TestStatus {
            phase: TestPhase::Idle,
            level: 0.0,
            last_error: Some("boom".to_string()),
        };
        assert!(status.is_error());

        let testing = TestStatus {
            phase: TestPhase::Testing,
            ..status.clone()
        };
        assert!(!testing.is_error());
    }

    #[test]
    fn test_level_cell_round_trips_value() {
        let cell = LevelCell::default();
        assert_eq!(cell.get(), 0.0);
        cell.set(0.75);
        assert_eq!(cell.clone().get(), 0.75);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: anyhow::Result<()> = bounded(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(is_timeout(&err));
        assert_eq!(
            MicTestError::capture_stop(err).to_string(),
            "Failed to stop microphone test: Timed out after 10ms"
        );
    }

    #[tokio::test]
    async fn test_bounded_passes_failure_through() {
        let result: anyhow::Result<()> =
            bounded(None, async { Err(anyhow::anyhow!("device busy")) }).await;

        let err = result.unwrap_err();
        assert!(!is_timeout(&err));
        assert_eq!(
            MicTestError::capture_stop(err).to_string(),
            "Failed to stop microphone test: device busy"
        );
    }
}
