//! Touch point → object resolution
//!
//! Cheap bbox filtering first; polygon work only when several boxes
//! overlap the touch point.

use std::collections::HashMap;

use super::geometry::{is_degenerate, PreparedPolygon};
use crate::types::{HandLandmarks, ObjectGeometry, ObjectId, Point, TouchEvent};

struct CachedPolygon {
    version: u64,
    /// `None` when the outline turned out degenerate at this version.
    prepared: Option<PreparedPolygon>,
}

/// Resolves touch points against the current object geometry.
#[derive(Default)]
pub struct ObjectMapper {
    cache: HashMap<ObjectId, CachedPolygon>,
    preparations: u64,
}

impl ObjectMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best object under `point`, if any.
    ///
    /// Candidates are objects whose bbox contains the point, smallest bbox
    /// first. A single candidate wins outright. With several, the smallest
    /// polygon that covers the point wins, falling back to the smallest bbox.
    pub fn pick(&mut self, point: Point, objects: &[ObjectGeometry]) -> Option<ObjectId> {
        let mut candidates: Vec<&ObjectGeometry> = objects
            .iter()
            .filter(|o| o.bbox.contains(point) && !is_degenerate(&o.polygon))
            .collect();

        match candidates.len() {
            0 => return None,
            1 => return Some(candidates[0].id),
            _ => {}
        }
        candidates.sort_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()));

        let mut best: Option<(ObjectId, f64)> = None;
        for obj in &candidates {
            let Some(prepared) = self.prepared(obj) else {
                continue;
            };
            if prepared.covers(point) && best.map_or(true, |(_, area)| prepared.area() < area) {
                best = Some((obj.id, prepared.area()));
            }
        }

        best.map(|(id, _)| id).or(Some(candidates[0].id))
    }

    /// Fill `object_id` on every event from the hand's landmark under its sensor.
    ///
    /// Events get `None` when no landmarks are available.
    pub fn map_events(
        &mut self,
        events: &mut [TouchEvent],
        landmarks: Option<&HandLandmarks>,
        objects: &[ObjectGeometry],
    ) {
        self.prune(objects);
        for event in events.iter_mut() {
            event.object_id = landmarks
                .and_then(|lm| lm.touch_point(usize::from(event.sensor)))
                .and_then(|point| self.pick(point, objects));
        }
    }

    /// Drop cache entries for objects that are no longer tracked.
    pub fn prune(&mut self, objects: &[ObjectGeometry]) {
        if self.cache.is_empty() {
            return;
        }
        self.cache.retain(|id, _| objects.iter().any(|o| o.id == *id));
    }

    /// Number of polygon preparations performed so far.
    pub fn preparations(&self) -> u64 {
        self.preparations
    }

    pub fn cached_objects(&self) -> usize {
        self.cache.len()
    }

    fn prepared(&mut self, obj: &ObjectGeometry) -> Option<&PreparedPolygon> {
        let stale = self
            .cache
            .get(&obj.id)
            .map_or(true, |c| c.version != obj.version);
        if stale {
            self.preparations += 1;
            self.cache.insert(
                obj.id,
                CachedPolygon {
                    version: obj.version,
                    prepared: PreparedPolygon::new(&obj.polygon),
                },
            );
        }
        self.cache.get(&obj.id).and_then(|c| c.prepared.as_ref())
    }
}
