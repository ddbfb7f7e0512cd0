use crate::audio::{
    CpalOutput, LocalMicrophone, MicrophoneTest, TestPhase, CAPTURE_SAMPLE_RATE,
};
use crate::cli::RunCliArgs;
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use hound::{WavSpec, WavWriter};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const METER_REFRESH_MS: u64 = 50;
/// Extra wait after the clip ends so the output device drains before closing.
const PLAYBACK_TAIL: Duration = Duration::from_millis(300);

/// Command-line flags merged over the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSettings {
    pub device: Option<String>,
    pub sensitivity: u8,
    pub duration: Duration,
    pub playback: bool,
    pub save: Option<PathBuf>,
}

impl TestSettings {
    pub fn resolve(args: RunCliArgs, config: &Config) -> Self {
        Self {
            device: args.device.or_else(|| config.microphone.device.clone()),
            sensitivity: args
                .sensitivity
                .unwrap_or(config.microphone.sensitivity)
                .min(100),
            duration: Duration::from_secs(
                args.duration.unwrap_or(config.test.duration_seconds).max(1),
            ),
            playback: config.playback.enabled && !args.no_playback,
            save: args.save,
        }
    }
}

pub async fn run_test(args: RunCliArgs) -> Result<()> {
    let config = Config::load()?;
    let settings = TestSettings::resolve(args, &config);

    let microphone = Arc::new(LocalMicrophone::new());
    let mut test = MicrophoneTest::new(
        microphone.clone(),
        microphone,
        Box::new(CpalOutput::new()),
    )
    .with_timeout(config.test.platform_timeout());

    // Running the command is the user gesture: open playback before awaiting anything.
    if settings.playback {
        test.prepare_playback();
    }

    let phase = test
        .start(settings.sensitivity, settings.device.as_deref())
        .await;
    if phase != TestPhase::Testing {
        return Err(recorded_error(&test));
    }

    println!(
        "Recording for {}s, speak now (Ctrl-C to stop early)",
        settings.duration.as_secs()
    );
    watch_level(&test, settings.duration).await?;

    let samples = test.stop().await;
    if test.last_error().is_some() {
        return Err(recorded_error(&test));
    }
    if samples.is_empty() {
        println!("Nothing was recorded.");
        return Ok(());
    }

    let clip = clip_duration(samples.len());
    println!("Captured {:.1}s of audio", clip.as_secs_f32());

    if let Some(path) = &settings.save {
        write_wav(path, &samples, CAPTURE_SAMPLE_RATE)?;
        println!("Saved recording to {}", path.display());
    }

    if settings.playback {
        println!("Playing back...");
        test.play_audio(&samples);
        tokio::time::sleep(clip + PLAYBACK_TAIL).await;
    }

    test.dispose();
    info!("Microphone test finished");
    Ok(())
}

fn recorded_error(test: &MicrophoneTest) -> anyhow::Error {
    anyhow!(test
        .last_error()
        .unwrap_or("Microphone test failed")
        .to_string())
}

/// Show the live input level until `duration` elapses or Ctrl-C is pressed.
async fn watch_level(test: &MicrophoneTest, duration: Duration) -> Result<()> {
    let meter = ProgressBar::new(100);
    meter.set_style(
        ProgressStyle::with_template("Level [{bar:40.green/white}] {pos:>3}%")
            .context("Invalid level meter template")?
            .progress_chars("=> "),
    );

    let deadline = tokio::time::sleep(duration);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(deadline);
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(METER_REFRESH_MS));

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut ctrl_c => {
                info!("Stopping microphone test early");
                break;
            }
            _ = ticker.tick() => meter.set_position(level_percent(test.level())),
        }
    }

    meter.finish_and_clear();
    Ok(())
}

fn level_percent(level: f32) -> u64 {
    (level.clamp(0.0, 1.0) * 100.0).round() as u64
}

fn clip_duration(samples: usize) -> Duration {
    Duration::from_secs_f64(samples as f64 / CAPTURE_SAMPLE_RATE as f64)
}

pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!("Recording saved: {:?} ({} samples)", path, samples.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_prefer_flags() {
        let mut config = Config::default();
        config.microphone.device = Some("Configured".to_string());

        let args = RunCliArgs {
            device: Some("Flag".to_string()),
            sensitivity: Some(90),
            duration: Some(2),
            no_playback: true,
            save: None,
        };
        let settings = TestSettings::resolve(args, &config);

        assert_eq!(settings.device.as_deref(), Some("Flag"));
        assert_eq!(settings.sensitivity, 90);
        assert_eq!(settings.duration, Duration::from_secs(2));
        assert!(!settings.playback);
    }

    #[test]
    fn test_settings_fall_back_to_config() {
        let mut config = Config::default();
        config.microphone.device = Some("Configured".to_string());
        config.playback.enabled = false;

        let settings = TestSettings::resolve(RunCliArgs::default(), &config);

        assert_eq!(settings.device.as_deref(), Some("Configured"));
        assert_eq!(settings.sensitivity, 50);
        assert_eq!(settings.duration, Duration::from_secs(5));
        assert!(!settings.playback);
    }

    #[test]
    fn test_zero_duration_is_raised_to_one_second() {
        let args = RunCliArgs {
            duration: Some(0),
            ..RunCliArgs::default()
        };
        let settings = TestSettings::resolve(args, &Config::default());
        assert_eq!(settings.duration, Duration::from_secs(1));
    }

    #[test]
    fn test_level_percent() {
        assert_eq!(level_percent(0.0), 0);
        assert_eq!(level_percent(0.426), 43);
        assert_eq!(level_percent(3.0), 100);
    }

    #[test]
    fn test_clip_duration() {
        assert_eq!(clip_duration(8000), Duration::from_millis(500));
    }

    #[test]
    fn test_write_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let samples = vec![0i16, 1000, -1000, i16::MAX];

        write_wav(&path, &samples, CAPTURE_SAMPLE_RATE).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }
}
