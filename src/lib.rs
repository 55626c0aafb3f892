//! touchloop: a glove-and-object touch instrument with a loop station
//!
//! Pressure sensors on two gloves are fused with camera-tracked objects:
//! pressing a finger onto a tracked object plays the sound mapped to that
//! (object, hand, sensor), and while a loop is armed the hit is recorded for
//! tempo-locked replay.
//!
//! ## Architecture
//!
//! - **Acquisition**: per-hand UDP worker threads deframing glove datagrams
//! - **Bridge**: bounded latest-value queues and the thread → task bridge
//! - **Touch**: EMA + hysteresis conditioning into on/off events
//! - **Fusion**: landmark → object mapping and sticky binding
//! - **Objects**: tracked-object gating, sound mappings, dispatch
//! - **Audio**: asset loading, allocation-free mixing, output drivers
//! - **Looper**: transport, loop library, boundary scheduler
//! - **Pipeline / Control**: engine context, tasks, command surface

pub mod acquisition;
pub mod audio;
pub mod bridge;
pub mod config;
pub mod control;
pub mod fusion;
pub mod looper;
pub mod objects;
pub mod pipeline;
pub mod status;
pub mod touch;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export commonly used types
pub use types::{
    BBox, Detection, DetectionSnapshot, Hand, HandLandmarks, ObjectId, Point, SensorFrame, SensorKey, TouchEvent,
    TouchKind,
};

// Re-export the engine surface
pub use audio::{SoundMixer, WavLoader};
pub use control::{Command, Controller};
pub use looper::{LoopError, LoopScheduler};
pub use objects::ObjectRegistry;
pub use pipeline::EngineContext;
pub use status::RuntimeStatus;
