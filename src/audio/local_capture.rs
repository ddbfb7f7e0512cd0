//! Microphone capture and level metering via cpal.
//!
//! `LocalMicrophone` plays both platform roles for a microphone test: it
//! pushes level updates to subscribers and records the clip that is handed
//! back on stop. Audio is captured at the device's native rate and converted
//! to 16 kHz mono PCM when the capture stops.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use super::bridge::{CaptureControl, LevelCallback, LevelStream, Subscription};
use super::resampler::{f32_to_i16, resample_linear, CAPTURE_SAMPLE_RATE};

/// Sensitivity at which the level meter applies no gain.
pub const UNITY_SENSITIVITY: u8 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(u64, LevelCallback)>,
}

impl Subscribers {
    fn insert(&mut self, callback: LevelCallback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.callbacks.push((id, callback));
        id
    }

    fn remove(&mut self, id: u64) {
        self.callbacks.retain(|(existing, _)| *existing != id);
    }

    fn emit(&self, level: f32) {
        for (_, callback) in &self.callbacks {
            callback(level);
        }
    }

    fn len(&self) -> usize {
        self.callbacks.len()
    }
}

struct CaptureSession {
    stream: cpal::Stream,
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    device_name: String,
}

pub struct LocalMicrophone {
    host: cpal::Host,
    session: Mutex<Option<CaptureSession>>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl LocalMicrophone {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            session: Mutex::new(None),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
        }
    }

    /// Names of every input device on the default host.
    pub fn list_input_devices(&self) -> Result<Vec<InputDeviceInfo>> {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|device| device.name().ok());

        let devices = self
            .host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .filter_map(|device| device.name().ok())
            .map(|name| InputDeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
            })
            .collect();

        Ok(devices)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }

    fn find_device(&self, device_name: Option<&str>) -> Result<cpal::Device> {
        match device_name {
            None => self
                .host
                .default_input_device()
                .context("No input device available"),
            Some(wanted) => self
                .host
                .input_devices()
                .context("Failed to enumerate input devices")?
                .find(|device| device.name().map(|name| name == wanted).unwrap_or(false))
                .with_context(|| format!("Input device not found: {wanted}")),
        }
    }
}

impl Default for LocalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl LevelStream for LocalMicrophone {
    async fn subscribe(&self, callback: LevelCallback) -> Result<Subscription> {
        let id = self
            .subscribers
            .lock()
            .map_err(|_| anyhow!("Level subscribers lock poisoned"))?
            .insert(callback);

        debug!("Level subscriber {} registered", id);

        let subscribers = Arc::clone(&self.subscribers);
        Ok(Subscription::new(move || {
            if let Ok(mut subs) = subscribers.lock() {
                subs.remove(id);
            }
        }))
    }
}

#[async_trait(?Send)]
impl CaptureControl for LocalMicrophone {
    async fn start_capture(&self, sensitivity: u8, device_name: Option<&str>) -> Result<()> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Capture state lock poisoned"))?;
        if session.is_some() {
            bail!("Microphone test already running");
        }

        let device = self.find_device(device_name)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device
            .default_input_config()
            .with_context(|| format!("Failed to read configuration of {name}"))?;
        let sample_rate = supported.sample_rate().0;
        let config = supported.config();
        let gain = sensitivity_gain(sensitivity);
        let samples = Arc::new(Mutex::new(Vec::new()));

        let meter = LevelMeter {
            channels: config.channels as usize,
            gain,
            samples: Arc::clone(&samples),
            subscribers: Arc::clone(&self.subscribers),
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input_stream::<f32>(&device, &config, meter),
            SampleFormat::I16 => build_input_stream::<i16>(&device, &config, meter),
            SampleFormat::U16 => build_input_stream::<u16>(&device, &config, meter),
            other => bail!("Unsupported input sample format: {other:?}"),
        }?;

        stream.play().context("Failed to start input stream")?;

        info!(
            "Capturing from {} ({} Hz, {} ch, gain {:.2})",
            name, sample_rate, config.channels, gain
        );

        *session = Some(CaptureSession {
            stream,
            samples,
            sample_rate,
            device_name: name,
        });
        Ok(())
    }

    async fn stop_capture(&self) -> Result<Vec<i16>> {
        let session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Capture state lock poisoned"))?
            .take()
            .context("Microphone test not running")?;

        let CaptureSession {
            stream,
            samples,
            sample_rate,
            device_name,
        } = session;
        drop(stream);

        let captured = {
            let mut guard = samples
                .lock()
                .map_err(|_| anyhow!("Capture buffer lock poisoned"))?;
            std::mem::take(&mut *guard)
        };

        info!(
            "Stopped capture from {}, {} samples at {} Hz",
            device_name,
            captured.len(),
            sample_rate
        );

        Ok(resample_linear(&captured, sample_rate, CAPTURE_SAMPLE_RATE)
            .into_iter()
            .map(f32_to_i16)
            .collect())
    }
}

/// Everything the input callback needs, moved onto the audio thread.
struct LevelMeter {
    channels: usize,
    gain: f32,
    samples: Arc<Mutex<Vec<f32>>>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl LevelMeter {
    fn process(&self, mono: &[f32]) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.extend_from_slice(mono);
        }

        let level = (rms(mono) * self.gain).clamp(0.0, 1.0);
        if let Ok(subs) = self.subscribers.lock() {
            subs.emit(level);
        }
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    meter: LevelMeter,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix(data, meter.channels);
                meter.process(&mono);
            },
            |err| error!("Microphone test stream error: {}", err),
            None,
        )
        .context("Failed to build input stream")?;

    Ok(stream)
}

/// Average interleaved frames down to one channel.
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| {
            frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
        })
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Level-meter gain for a 0..=100 sensitivity; 50 is unity.
pub fn sensitivity_gain(sensitivity: u8) -> f32 {
    sensitivity.min(100) as f32 / UNITY_SENSITIVITY as f32
}
