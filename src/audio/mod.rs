pub mod bridge;
pub mod cpal_output;
pub mod local_capture;
pub mod microphone_test;
pub mod playback_context;
pub mod resampler;

pub use bridge::{
    AudioOutput, CaptureControl, LevelCallback, LevelStream, PlaybackBuffer, PlaybackContext,
    Subscription,
};
pub use cpal_output::CpalOutput;
pub use local_capture::{InputDeviceInfo, LocalMicrophone};
pub use microphone_test::{MicrophoneTest, TestPhase, TestStatus};
pub use playback_context::ContextState;
pub use resampler::{resample_i16_to_f32, CAPTURE_SAMPLE_RATE};
