//! Failure taxonomy for the microphone test.
//!
//! None of these escape the controller's public operations: they are recorded
//! as the `last_error` string and the test returns to idle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MicTestError {
    #[error("Failed to subscribe to microphone level: {0}")]
    Subscription(String),

    #[error("Failed to start microphone test: {0}")]
    CaptureStart(String),

    #[error("Failed to stop microphone test: {0}")]
    CaptureStop(String),

    #[error("Failed to schedule playback: {0}")]
    PlaybackScheduling(String),

    #[error("Timed out after {0}ms")]
    Timeout(u128),
}

impl MicTestError {
    pub fn subscription(err: anyhow::Error) -> Self {
        Self::Subscription(format!("{err:#}"))
    }

    pub fn capture_start(err: anyhow::Error) -> Self {
        Self::CaptureStart(format!("{err:#}"))
    }

    pub fn capture_stop(err: anyhow::Error) -> Self {
        Self::CaptureStop(format!("{err:#}"))
    }

    pub fn playback(err: anyhow::Error) -> Self {
        Self::PlaybackScheduling(format!("{err:#}"))
    }
}
