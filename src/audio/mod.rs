//! Sound playback
//!
//! - [`asset`]: decoded, immutable sound buffers and their loaders
//! - [`mixer`]: allocation-free polyphonic mixing
//! - [`device`]: output drivers (system device or paced null output)

pub mod asset;
pub mod device;
pub mod mixer;

pub use asset::{AssetCache, AssetError, AssetLoader, SoundAsset, WavLoader};
pub use device::{AudioOutput, NullOutput, OutputError};
pub use mixer::{MixRenderer, SoundMixer, SoundSink, VoiceHandle};
