//! Detector snapshots delivered by the external vision stages

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Hand, ObjectId, SENSORS_PER_HAND};

/// A 2-D point in camera pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in top-left / width / height form.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.w && p.y >= self.y && p.y <= self.y + self.h
    }

    pub fn area(&self) -> f64 {
        self.w.max(0.0) * self.h.max(0.0)
    }
}

/// One detected object as reported by the detector for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub confidence: f32,
    /// Ordered outline points. Empty or fewer than three points means no
    /// usable segmentation this frame.
    #[serde(default)]
    pub polygon: Vec<Point>,
    pub bbox: BBox,
}

/// Detector output for one camera frame, keyed by track id.
pub type DetectionSnapshot = BTreeMap<ObjectId, Detection>;

/// Geometry of one tracked object as published to the fusion tasks.
///
/// `version` changes whenever the registry accepts a new outline, which
/// is what prepared-polygon caches key on.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGeometry {
    pub id: ObjectId,
    pub version: u64,
    pub bbox: BBox,
    pub polygon: Arc<[Point]>,
}

/// Immutable view of every tracked object's geometry.
pub type GeometrySnapshot = Vec<ObjectGeometry>;

/// Seven tracked landmarks of one hand, in sensor-channel order:
/// thumb tip, index tip, middle tip, ring tip, pinky tip, wrist, pinky MCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub hand: Hand,
    pub points: [Point; SENSORS_PER_HAND],
    /// Camera frame timestamp in seconds.
    #[serde(default)]
    pub timestamp: f64,
}

impl HandLandmarks {
    /// Landmark under the given sensor channel.
    pub fn touch_point(&self, sensor: usize) -> Option<Point> {
        self.points.get(sensor).copied()
    }
}
