//! Shared data structures for the touch-to-sound pipeline
//!
//! This module defines the core types that flow between subsystems:
//! - Acquisition: SensorFrame / SensorSample (raw glove readings)
//! - Touch: TouchEvent (discrete on/off/aftertouch triggers)
//! - Vision: DetectionSnapshot, HandLandmarks (external detector input)
//! - Fusion: ObjectId, SensorKey (binding identities)

mod hand;
mod touch;
mod vision;

pub use hand::*;
pub use touch::*;
pub use vision::*;
