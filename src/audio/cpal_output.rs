//! Playback through the default output device via cpal.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use super::bridge::{AudioOutput, PlaybackBuffer, PlaybackContext};

pub struct CpalOutput {
    host: cpal::Host,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalOutput {
    fn create_context(&self) -> Result<Box<dyn PlaybackContext>> {
        Ok(Box::new(CpalContext::open(&self.host)?))
    }
}

struct Voice {
    samples: Vec<f32>,
    position: usize,
}

/// Sums every scheduled buffer into one mono signal.
#[derive(Default)]
struct Mixer {
    voices: Vec<Voice>,
}

impl Mixer {
    fn push(&mut self, samples: Vec<f32>) {
        self.voices.push(Voice {
            samples,
            position: 0,
        });
    }

    fn next_sample(&mut self) -> f32 {
        let mut sum = 0.0;
        for voice in &mut self.voices {
            if let Some(&sample) = voice.samples.get(voice.position) {
                sum += sample;
                voice.position += 1;
            }
        }
        self.voices
            .retain(|voice| voice.position < voice.samples.len());
        sum
    }

    fn is_idle(&self) -> bool {
        self.voices.is_empty()
    }

    fn clear(&mut self) {
        self.voices.clear();
    }
}

struct CpalContext<S = cpal::Stream> {
    stream: Option<S>,
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    suspended: bool,
}

impl CpalContext {
    fn open(host: &cpal::Host) -> Result<Self> {
        let device = host
            .default_output_device()
            .context("No output device available")?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device
            .default_output_config()
            .with_context(|| format!("Failed to read configuration of {name}"))?;
        let sample_rate = supported.sample_rate().0;
        let config = supported.config();
        let mixer = Arc::new(Mutex::new(Mixer::default()));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output_stream::<f32>(&device, &config, Arc::clone(&mixer)),
            SampleFormat::I16 => build_output_stream::<i16>(&device, &config, Arc::clone(&mixer)),
            SampleFormat::U16 => build_output_stream::<u16>(&device, &config, Arc::clone(&mixer)),
            other => bail!("Unsupported output sample format: {other:?}"),
        }?;

        info!(
            "Playback device {} ({} Hz, {} ch)",
            name, sample_rate, config.channels
        );

        Ok(Self::suspended(stream, mixer, sample_rate))
    }
}

impl<S: StreamTrait> CpalContext<S> {
    /// Wrap a freshly built stream. Some backends start streams immediately,
    /// others never start them on their own, so the context always reports
    /// suspended and the first `resume` plays the stream.
    fn suspended(stream: S, mixer: Arc<Mutex<Mixer>>, sample_rate: u32) -> Self {
        if let Err(e) = stream.pause() {
            debug!("Output stream could not be paused: {}", e);
        }

        Self {
            stream: Some(stream),
            mixer,
            sample_rate,
            suspended: true,
        }
    }
}

impl<S: StreamTrait> PlaybackContext for CpalContext<S> {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().context("Playback context is closed")?;
        stream.play().context("Failed to resume output stream")?;
        self.suspended = false;
        Ok(())
    }

    fn play(&mut self, buffer: PlaybackBuffer) -> Result<()> {
        if self.stream.is_none() {
            bail!("Playback context is closed");
        }
        if buffer.sample_rate() != self.sample_rate {
            bail!(
                "Buffer rate {} Hz does not match output rate {} Hz",
                buffer.sample_rate(),
                self.sample_rate
            );
        }

        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| anyhow!("Playback mixer lock poisoned"))?;
        mixer.push(buffer.into_samples());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Failed to pause output stream before close: {}", e);
            }
            drop(stream);
        }
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.clear();
        }
        Ok(())
    }
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let Ok(mut mixer) = mixer.lock() else {
                    data.fill(T::EQUILIBRIUM);
                    return;
                };
                if mixer.is_idle() {
                    data.fill(T::EQUILIBRIUM);
                    return;
                }
                for frame in data.chunks_mut(channels.max(1)) {
                    let value = T::from_sample(mixer.next_sample().clamp(-1.0, 1.0));
                    frame.fill(value);
                }
            },
            |err| error!("Playback stream error: {}", err),
            None,
        )
        .context("Failed to build output stream")?;

    Ok(stream)
}
