//! One tracked object and its area-plausibility gate
//!
//! Segmentation outlines from the detector jump around: hands occlude
//! objects, masks merge with neighbours. An update is only accepted when
//! its area is plausible against a slowly adapting baseline. Rejections
//! accumulate in an occlusion streak; once the streak reaches the
//! tolerance the baseline drifts toward what the detector keeps reporting,
//! so a genuinely changed object is eventually accepted.

use std::sync::Arc;

use serde::Serialize;

use super::mapping::MappingTable;
use crate::config::ObjectsConfig;
use crate::fusion::{is_degenerate, polygon_area};
use crate::types::{BBox, Detection, ObjectGeometry, ObjectId, Point};

/// Outcome of one detector update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Accepted,
    /// Empty or degenerate outline.
    RejectedEmpty,
    /// Area fell below the visibility ratio (likely occluded).
    RejectedShrunk,
    /// Area grew beyond the growth ratio (likely a mask jump).
    RejectedGrown,
}

impl GateOutcome {
    pub fn is_accepted(self) -> bool {
        self == GateOutcome::Accepted
    }
}

#[derive(Debug)]
pub struct TrackedObject {
    id: ObjectId,
    class_name: Option<String>,
    confidence: f32,
    polygon: Arc<[Point]>,
    bbox: BBox,
    baseline_area: Option<f64>,
    occlusion_streak: u32,
    version: u64,
    pub(crate) mappings: MappingTable,
}

impl TrackedObject {
    /// A placeholder with no geometry yet.
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            class_name: None,
            confidence: 0.0,
            polygon: Arc::from(Vec::new()),
            bbox: BBox::default(),
            baseline_area: None,
            occlusion_streak: 0,
            version: 0,
            mappings: MappingTable::default(),
        }
    }

    /// Run one detection through the gate, applying it if accepted.
    pub fn apply_detection(&mut self, det: &Detection, cfg: &ObjectsConfig) -> GateOutcome {
        let (outcome, area) = self.gate(&det.polygon, cfg);
        if outcome.is_accepted() {
            self.class_name = det.class_name.clone();
            self.confidence = det.confidence;
            self.polygon = Arc::from(det.polygon.as_slice());
            self.bbox = det.bbox;
            self.version += 1;

            let baseline = self.baseline_area.unwrap_or(area);
            self.baseline_area =
                Some((1.0 - cfg.baseline_smoothing) * baseline + cfg.baseline_smoothing * area);
            self.occlusion_streak = 0;
        }
        outcome
    }

    fn gate(&mut self, polygon: &[Point], cfg: &ObjectsConfig) -> (GateOutcome, f64) {
        if is_degenerate(polygon) {
            if self.bump_streak(cfg) {
                if let Some(base) = self.baseline_area.as_mut() {
                    *base *= cfg.empty_decay;
                }
            }
            return (GateOutcome::RejectedEmpty, 0.0);
        }

        let area = polygon_area(polygon);
        let Some(base) = self.baseline_area else {
            return (GateOutcome::Accepted, area);
        };

        let ratio = area / if base > 0.0 { base } else { 1.0 };

        if ratio < cfg.min_visibility_ratio {
            if self.bump_streak(cfg) {
                self.baseline_area = Some(base * cfg.shrink_decay);
            }
            return (GateOutcome::RejectedShrunk, area);
        }

        if ratio > cfg.max_growth_ratio {
            if self.bump_streak(cfg) {
                self.baseline_area = Some((base * area).sqrt());
            }
            return (GateOutcome::RejectedGrown, area);
        }

        (GateOutcome::Accepted, area)
    }

    /// Count one rejection. Returns true (and resets) when the tolerance is hit.
    fn bump_streak(&mut self, cfg: &ObjectsConfig) -> bool {
        self.occlusion_streak += 1;
        if self.occlusion_streak >= cfg.occluded_tolerance {
            self.occlusion_streak = 0;
            true
        } else {
            false
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn baseline_area(&self) -> Option<f64> {
        self.baseline_area
    }

    pub fn occlusion_streak(&self) -> u32 {
        self.occlusion_streak
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether any outline has been accepted yet.
    pub fn has_geometry(&self) -> bool {
        self.version > 0
    }

    pub fn geometry(&self) -> ObjectGeometry {
        ObjectGeometry {
            id: self.id,
            version: self.version,
            bbox: self.bbox,
            polygon: Arc::clone(&self.polygon),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_detection(side: f64) -> Detection {
        Detection {
            class_name: Some("cup".to_string()),
            confidence: 0.9,
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(side, 0.0),
                Point::new(side, side),
                Point::new(0.0, side),
            ],
            bbox: BBox::new(0.0, 0.0, side, side),
        }
    }

    fn empty_detection() -> Detection {
        Detection {
            class_name: Some("cup".to_string()),
            confidence: 0.9,
            polygon: Vec::new(),
            bbox: BBox::default(),
        }
    }

    #[test]
    fn test_first_detection_sets_baseline() {
        let mut obj = TrackedObject::new(1);
        let cfg = ObjectsConfig::default();
        assert_eq!(obj.apply_detection(&square_detection(10.0), &cfg), GateOutcome::Accepted);
        assert_eq!(obj.baseline_area(), Some(100.0));
        assert_eq!(obj.version(), 1);
        assert_eq!(obj.class_name(), Some("cup"));
    }

    #[test]
    fn test_accepted_update_lowpasses_baseline() {
        let mut obj = TrackedObject::new(1);
        let cfg = ObjectsConfig::default();
        obj.apply_detection(&square_detection(10.0), &cfg);
        // 120 is within [0.95, 3.0] of 100.
        assert!(obj.apply_detection(&square_detection(120f64.sqrt()), &cfg).is_accepted());
        let base = obj.baseline_area().unwrap();
        assert!((base - 102.0).abs() < 1e-6, "baseline {base}");
        assert_eq!(obj.version(), 2);
    }

    #[test]
    fn test_ten_percent_area_rejected() {
        let mut obj = TrackedObject::new(1);
        let cfg = ObjectsConfig::default();
        obj.apply_detection(&square_detection(10.0), &cfg);
        assert_eq!(
            obj.apply_detection(&square_detection(10f64.sqrt()), &cfg),
            GateOutcome::RejectedShrunk
        );
        assert_eq!(obj.version(), 1);
        assert_eq!(obj.polygon().len(), 4);
        assert_eq!(obj.bbox().w, 10.0);
        assert_eq!(obj.occlusion_streak(), 1);
        assert_eq!(obj.baseline_area(), Some(100.0));
    }

    #[test]
    fn test_shrink_streak_decays_baseline_and_resets() {
        let mut obj = TrackedObject::new(1);
        let cfg = ObjectsConfig::default();
        obj.apply_detection(&square_detection(10.0), &cfg);
        for _ in 0..cfg.occluded_tolerance - 1 {
            obj.apply_detection(&square_detection(3.0), &cfg);
        }
        assert_eq!(obj.occlusion_streak(), cfg.occluded_tolerance - 1);
        assert_eq!(obj.baseline_area(), Some(100.0));

        obj.apply_detection(&square_detection(3.0), &cfg);
        assert_eq!(obj.occlusion_streak(), 0);
        assert!((obj.baseline_area().unwrap() - 97.0).abs() < 1e-9);
    }

    #[test]
    fn test_growth_streak_drifts_geometrically() {
        let mut obj = TrackedObject::new(1);
        let cfg = ObjectsConfig {
            occluded_tolerance: 2,
            ..ObjectsConfig::default()
        };
        obj.apply_detection(&square_detection(10.0), &cfg);
        // 400 / 100 = 4 > 3.
        assert_eq!(obj.apply_detection(&square_detection(20.0), &cfg), GateOutcome::RejectedGrown);
        obj.apply_detection(&square_detection(20.0), &cfg);
        assert!((obj.baseline_area().unwrap() - 200.0).abs() < 1e-9);
        // Now 400 / 200 = 2 is plausible.
        assert!(obj.apply_detection(&square_detection(20.0), &cfg).is_accepted());
    }

    #[test]
    fn test_empty_outline_counts_as_occlusion() {
        let mut obj = TrackedObject::new(1);
        let cfg = ObjectsConfig {
            occluded_tolerance: 3,
            ..ObjectsConfig::default()
        };
        obj.apply_detection(&square_detection(10.0), &cfg);
        for _ in 0..3 {
            assert_eq!(obj.apply_detection(&empty_detection(), &cfg), GateOutcome::RejectedEmpty);
        }
        assert!((obj.baseline_area().unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(obj.occlusion_streak(), 0);
    }

    #[test]
    fn test_empty_outline_without_baseline_is_rejected() {
        let mut obj = TrackedObject::new(1);
        let cfg = ObjectsConfig::default();
        assert_eq!(obj.apply_detection(&empty_detection(), &cfg), GateOutcome::RejectedEmpty);
        assert!(!obj.has_geometry());
        assert_eq!(obj.baseline_area(), None);
    }
}
