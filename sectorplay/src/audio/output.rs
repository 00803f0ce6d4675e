//! Audio output using cpal
//!
//! Opens the default output device and runs a callback-based stream. The
//! callback is handed a closure producing one stereo frame per call; when no
//! audio is available it must return silence rather than block.

use crate::audio::types::AudioFrame;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tracing::{debug, error, info};

/// Audio device and stream wrapper
///
/// Not `Send`: the cpal stream stays on the thread that built it, so this is
/// constructed on the audio feed thread and dropped on its exit path.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl AudioOutput {
    /// Open the default output device, preferring the requested sample rate
    /// with stereo f32 output
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using default audio device: {}", name);

        let (config, sample_format) = Self::get_best_config(&device, sample_rate)?;
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
        })
    }

    /// Sample rate the stream will actually run at
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn get_best_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= sample_rate
                && config.max_sample_rate().0 >= sample_rate
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, sample_format));
        }

        // Fallback: device default config
        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        let config = supported_config.config();
        Ok((config, sample_format))
    }

    /// Start the stream with a per-frame sample callback
    ///
    /// The callback runs on the real-time audio thread; it must not block.
    pub fn start<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut() -> AudioFrame + Send + 'static,
    {
        info!("Starting audio stream");

        if self.sample_format != SampleFormat::F32 {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                self.sample_format
            )));
        }

        let channels = self.config.channels as usize;
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let audio_frame = callback();
                        frame[0] = audio_frame.left.clamp(-1.0, 1.0);
                        if channels > 1 {
                            frame[1] = audio_frame.right.clamp(-1.0, 1.0);
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        info!("Audio stream started");
        Ok(())
    }

    /// Stop and drop the stream
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio stream stopped");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
