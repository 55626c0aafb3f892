//! Decoded sound buffers and the loaders that produce them

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::config::defaults::OUTPUT_CHANNELS;

/// Asset loading errors
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("{path} is {found} Hz but the engine runs at {expected} Hz (resample it first)")]
    SampleRateMismatch { path: PathBuf, expected: u32, found: u32 },

    #[error("{path} contains no audio")]
    Empty { path: PathBuf },

    #[error("{path}: unsupported sample format ({bits}-bit {format})")]
    UnsupportedFormat { path: PathBuf, bits: u16, format: &'static str },
}

/// An immutable, fully decoded sound at the engine sample rate.
///
/// Samples are interleaved stereo `f32` in [-1, 1].
#[derive(Debug)]
pub struct SoundAsset {
    path: String,
    sample_rate: u32,
    samples: Box<[f32]>,
}

impl SoundAsset {
    /// Build from interleaved samples with `channels` channels.
    ///
    /// Mono is duplicated to both sides; more than two channels are
    /// averaged down to mono first.
    pub fn from_interleaved(path: impl Into<String>, sample_rate: u32, channels: usize, data: &[f32]) -> Self {
        let channels = channels.max(1);
        let frames = data.len() / channels;
        let mut samples = Vec::with_capacity(frames * OUTPUT_CHANNELS);

        for frame in data.chunks_exact(channels) {
            match channels {
                1 => {
                    samples.push(frame[0]);
                    samples.push(frame[0]);
                }
                2 => samples.extend_from_slice(frame),
                n => {
                    let mono = frame.iter().sum::<f32>() / n as f32;
                    samples.push(mono);
                    samples.push(mono);
                }
            }
        }

        Self {
            path: path.into(),
            sample_rate,
            samples: samples.into_boxed_slice(),
        }
    }

    /// Short decaying sine used as the metronome click.
    pub fn click(sample_rate: u32, freq_hz: f64, duration_secs: f64) -> Self {
        let frames = (f64::from(sample_rate) * duration_secs).round() as usize;
        let mono: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f64 / f64::from(sample_rate);
                let env = (-t * 8.0 / duration_secs).exp();
                ((TAU * freq_hz * t).sin() * env) as f32
            })
            .collect();
        Self::from_interleaved("<click>", sample_rate, 1, &mono)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved stereo samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Length in stereo frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / OUTPUT_CHANNELS
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate.max(1))
    }
}

/// Decodes audio files into [`SoundAsset`]s.
pub trait AssetLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<SoundAsset, AssetError>;
}

/// WAV loader (PCM integer or float). No resampling is done: files must
/// already be at the engine rate.
pub struct WavLoader {
    sample_rate: u32,
}

impl WavLoader {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl AssetLoader for WavLoader {
    fn load(&self, path: &Path) -> Result<SoundAsset, AssetError> {
        let decode = |source| AssetError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = hound::WavReader::open(path).map_err(decode)?;
        let spec = reader.spec();
        if spec.sample_rate != self.sample_rate {
            return Err(AssetError::SampleRateMismatch {
                path: path.to_path_buf(),
                expected: self.sample_rate,
                found: spec.sample_rate,
            });
        }

        let data: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(decode)?,
            (hound::SampleFormat::Int, bits @ 1..=32) => {
                let scale = 1.0 / (1u64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(decode)?
            }
            (format, bits) => {
                return Err(AssetError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    bits,
                    format: match format {
                        hound::SampleFormat::Float => "float",
                        hound::SampleFormat::Int => "int",
                    },
                })
            }
        };

        if data.is_empty() {
            return Err(AssetError::Empty {
                path: path.to_path_buf(),
            });
        }

        let asset = SoundAsset::from_interleaved(
            path.to_string_lossy(),
            spec.sample_rate,
            usize::from(spec.channels),
            &data,
        );
        debug!(path = %path.display(), frames = asset.frames(), "Decoded WAV asset");
        Ok(asset)
    }
}

/// Loads each path once and hands out shared references afterwards.
pub struct AssetCache {
    loader: Arc<dyn AssetLoader>,
    assets: Mutex<HashMap<String, Arc<SoundAsset>>>,
}

impl AssetCache {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            loader,
            assets: Mutex::new(HashMap::new()),
        }
    }

    /// Cached asset for `path`, decoding it on first request.
    ///
    /// Decoding runs without holding the cache lock.
    pub fn get_or_load(&self, path: &str) -> Result<Arc<SoundAsset>, AssetError> {
        if let Some(asset) = self.lock().get(path) {
            return Ok(Arc::clone(asset));
        }

        let asset = Arc::new(self.loader.load(Path::new(path))?);
        info!(path, duration_secs = asset.duration_secs(), "Loaded sound asset");

        let mut assets = self.lock();
        let entry = assets.entry(path.to_string()).or_insert(asset);
        Ok(Arc::clone(entry))
    }

    /// Cached asset for `path`, without decoding.
    pub fn cached(&self, path: &str) -> Option<Arc<SoundAsset>> {
        self.lock().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SoundAsset>>> {
        self.assets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let asset = SoundAsset::from_interleaved("m", 48_000, 1, &[0.1, 0.2, 0.3]);
        assert_eq!(asset.frames(), 3);
        assert_eq!(asset.samples(), &[0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_multichannel_is_averaged() {
        let asset = SoundAsset::from_interleaved("q", 48_000, 4, &[0.4, 0.0, 0.0, 0.0]);
        assert_eq!(asset.frames(), 1);
        assert!((asset.samples()[0] - 0.1).abs() < 1e-6);
        assert_eq!(asset.samples()[0], asset.samples()[1]);
    }

    #[test]
    fn test_click_has_expected_length_and_range() {
        let click = SoundAsset::click(48_000, 1600.0, 0.03);
        assert_eq!(click.frames(), 1440);
        assert!(click.samples().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_wav_loader_reads_pcm16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 48_000, 2, &[16384, -16384, 0, 32767]);
        let asset = WavLoader::new(48_000).load(&path).unwrap();
        assert_eq!(asset.frames(), 2);
        assert!((asset.samples()[0] - 0.5).abs() < 1e-4);
        assert!((asset.samples()[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_wav_loader_rejects_rate_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd.wav");
        write_wav(&path, 44_100, 1, &[0; 16]);
        let err = WavLoader::new(48_000).load(&path).unwrap_err();
        assert!(matches!(err, AssetError::SampleRateMismatch { found: 44_100, .. }));
    }

    #[test]
    fn test_wav_loader_missing_file() {
        let err = WavLoader::new(48_000).load(Path::new("/no/such/file.wav")).unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }

    #[test]
    fn test_cache_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        write_wav(&path, 48_000, 1, &[1000; 32]);
        let cache = AssetCache::new(Arc::new(WavLoader::new(48_000)));
        let p = path.to_string_lossy();
        let a = cache.get_or_load(&p).unwrap();
        let b = cache.get_or_load(&p).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }
}
