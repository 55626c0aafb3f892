//! Audio output drivers
//!
//! Two ways to pull blocks out of a [`MixRenderer`]:
//! - the system's default output device via cpal (feature `audio-device`)
//! - a paced null output thread that renders and discards blocks at the
//!   engine rate, so voice lifetimes behave the same without hardware

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::mixer::{MixRenderer, SoundMixer};
use crate::config::defaults::OUTPUT_CHANNELS;
use crate::config::AudioConfig;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("this build has no device support (enable the `audio-device` feature)")]
    DeviceSupportDisabled,

    #[error("failed to spawn output thread: {0}")]
    Spawn(std::io::Error),
}

/// A running output. Dropping it stops rendering.
pub enum AudioOutput {
    Null(NullOutput),
    #[cfg(feature = "audio-device")]
    Device(DeviceOutput),
}

impl AudioOutput {
    /// Start the configured output driver.
    pub fn start(config: &AudioConfig, mixer: &SoundMixer) -> Result<Self, OutputError> {
        if config.use_device {
            #[cfg(feature = "audio-device")]
            {
                return DeviceOutput::start(config, mixer.renderer()).map(AudioOutput::Device);
            }
            #[cfg(not(feature = "audio-device"))]
            {
                return Err(OutputError::DeviceSupportDisabled);
            }
        }
        NullOutput::spawn(config, mixer.clone()).map(AudioOutput::Null)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioOutput::Null(_) => "null",
            #[cfg(feature = "audio-device")]
            AudioOutput::Device(_) => "device",
        }
    }

    /// Stop rendering and wait for the driver to wind down.
    pub fn stop(self) {
        match self {
            AudioOutput::Null(null) => null.stop(),
            #[cfg(feature = "audio-device")]
            AudioOutput::Device(device) => drop(device),
        }
    }
}

// ============================================================================
// Null output
// ============================================================================

/// Renders blocks on a dedicated thread paced to the sample clock.
pub struct NullOutput {
    stop: Arc<AtomicBool>,
    blocks: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl NullOutput {
    pub fn spawn(config: &AudioConfig, mixer: SoundMixer) -> Result<Self, OutputError> {
        let stop = Arc::new(AtomicBool::new(false));
        let blocks = Arc::new(AtomicU64::new(0));
        let period = Duration::from_secs_f64(config.block_size as f64 / f64::from(config.sample_rate.max(1)));
        let block_samples = config.block_size * OUTPUT_CHANNELS;
        let mut renderer = mixer.renderer();

        let thread = {
            let stop = Arc::clone(&stop);
            let blocks = Arc::clone(&blocks);
            std::thread::Builder::new()
                .name("audio-null".to_string())
                .spawn(move || {
                    let mut buf = vec![0.0f32; block_samples];
                    let mut deadline = Instant::now();
                    while !stop.load(Ordering::Acquire) {
                        renderer.render(&mut buf);
                        blocks.fetch_add(1, Ordering::Relaxed);
                        mixer.release_retired();

                        deadline += period;
                        let now = Instant::now();
                        if deadline > now {
                            std::thread::sleep(deadline - now);
                        } else if now - deadline > period * 8 {
                            // Fell far behind (suspended process); resync instead of bursting.
                            deadline = now;
                        }
                    }
                })
                .map_err(OutputError::Spawn)?
        };

        info!(
            block_ms = period.as_secs_f64() * 1000.0,
            "[AudioOutput] Null output running"
        );
        Ok(Self {
            stop,
            blocks,
            thread: Some(thread),
        })
    }

    /// Blocks rendered so far.
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("[AudioOutput] Null output thread panicked");
            }
        }
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Device output
// ============================================================================

#[cfg(feature = "audio-device")]
pub use device_output::DeviceOutput;

#[cfg(feature = "audio-device")]
mod device_output {
    use super::{MixRenderer, OutputError, OUTPUT_CHANNELS};
    use crate::config::AudioConfig;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{error, info};

    /// cpal stream kept alive for as long as this value exists.
    ///
    /// cpal streams are not `Send` on every platform, so this stays on the
    /// thread that created it.
    pub struct DeviceOutput {
        _stream: cpal::Stream,
    }

    impl DeviceOutput {
        pub fn start(config: &AudioConfig, mut renderer: MixRenderer) -> Result<Self, OutputError> {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(OutputError::NoDevice)?;

            let stream_config = cpal::StreamConfig {
                channels: OUTPUT_CHANNELS as u16,
                sample_rate: cpal::SampleRate(config.sample_rate),
                buffer_size: cpal::BufferSize::Fixed(config.block_size as u32),
            };

            info!(
                "[AudioOutput] {} @ {} Hz, {} frames",
                device.name().unwrap_or_else(|_| "Unknown".to_string()),
                config.sample_rate,
                config.block_size
            );

            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
                    |err| error!("[AudioOutput] Stream error: {}", err),
                    None,
                )
                .map_err(|e| OutputError::Device(e.to_string()))?;

            stream.play().map_err(|e| OutputError::Device(e.to_string()))?;
            Ok(Self { _stream: stream })
        }
    }
}
