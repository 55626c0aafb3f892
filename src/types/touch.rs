//! Sensor readings and touch events

use serde::{Deserialize, Serialize};

use super::{Hand, SensorKey};

/// Number of raw pressure readings carried by one glove datagram.
pub const RAW_CHANNELS_PER_FRAME: usize = 6;

/// Tracked-object identifier assigned by the upstream detector.
pub type ObjectId = u32;

/// One deframed glove datagram: all channels of one hand at one instant.
///
/// Values are already inverted (`max - raw`), so larger means harder press.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub hand: Hand,
    /// Board timestamp in seconds (microsecond counter / 1e6).
    pub timestamp: f64,
    pub values: [u16; RAW_CHANNELS_PER_FRAME],
}

impl SensorFrame {
    /// Iterate the frame as individual per-channel samples.
    pub fn samples(&self) -> impl Iterator<Item = SensorSample> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(sensor, &raw)| SensorSample {
                hand: self.hand,
                sensor,
                timestamp: self.timestamp,
                raw,
            })
    }
}

/// One raw reading from one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub hand: Hand,
    pub sensor: usize,
    pub timestamp: f64,
    pub raw: u16,
}

/// Touch event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchKind {
    /// Sensor crossed the on-threshold (press).
    On,
    /// Sensor fell below the off-threshold (release).
    Off,
    /// Pressure change while held. Only emitted when enabled in config.
    Aftertouch,
}

impl std::fmt::Display for TouchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TouchKind::On => write!(f, "on"),
            TouchKind::Off => write!(f, "off"),
            TouchKind::Aftertouch => write!(f, "aftertouch"),
        }
    }
}

/// Discrete trigger produced by the touch processor and enriched by fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    #[serde(rename = "type")]
    pub kind: TouchKind,
    pub hand: Hand,
    #[serde(rename = "sensor_idx")]
    pub sensor: u8,
    /// Normalized strike strength in [0, 1] (0 for releases).
    pub velocity: f32,
    /// Board timestamp in seconds.
    pub timestamp: f64,
    /// Pressure delta since press (aftertouch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_delta: Option<f32>,
    /// Bound object, filled in by the mapper/binder stage.
    pub object_id: Option<ObjectId>,
}

impl TouchEvent {
    pub fn key(&self) -> SensorKey {
        SensorKey {
            hand: self.hand,
            sensor: self.sensor,
        }
    }

    pub fn is_on(&self) -> bool {
        self.kind == TouchKind::On
    }
}
