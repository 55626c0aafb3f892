//! Tracked-object registry
//!
//! Owns every tracked object behind one mutex that is held only for
//! identity updates (insert, remove, gate, mapping edits). After every
//! geometry change a fresh immutable snapshot is published through
//! `ArcSwap`, so the fusion tasks read geometry without touching the lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use serde::Serialize;
use tracing::{debug, warn};

use super::mapping::{
    check_volume, MappingAction, MappingError, MappingInfo, MappingRequest, MappingResult, SoundMapping,
    Trigger, TriggerSink,
};
use super::tracked::{GateOutcome, TrackedObject};
use crate::audio::{AssetCache, AssetLoader, SoundAsset};
use crate::config::defaults::UNSET_PATH_SENTINEL;
use crate::config::ObjectsConfig;
use crate::types::{BBox, DetectionSnapshot, GeometrySnapshot, ObjectId, Point, SensorKey, TouchEvent};

/// Result of an `add_objects` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddReport {
    pub added: Vec<ObjectId>,
    pub skipped: Vec<ObjectId>,
}

/// Result of a `remove_objects` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub removed: Vec<ObjectId>,
    pub not_found: Vec<ObjectId>,
}

/// Per-snapshot gate statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionReport {
    pub accepted: usize,
    pub rejected: usize,
    pub created: usize,
    pub ignored: usize,
}

/// Display view of one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatObject {
    pub class_name: Option<String>,
    pub confidence: Option<f32>,
    pub bbox: Option<BBox>,
    pub polygon: Option<Vec<Point>>,
}

/// Why a touch event did or did not produce a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Triggered,
    /// Not an on-event.
    NotOn,
    NoObject,
    UnknownObject,
    Unmapped,
}

pub struct ObjectRegistry {
    config: ObjectsConfig,
    objects: Mutex<BTreeMap<ObjectId, TrackedObject>>,
    geometry: ArcSwap<GeometrySnapshot>,
    assets: Arc<AssetCache>,
}

impl ObjectRegistry {
    pub fn new(config: ObjectsConfig, loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            config,
            objects: Mutex::new(BTreeMap::new()),
            geometry: ArcSwap::from_pointee(Vec::new()),
            assets: Arc::new(AssetCache::new(loader)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ObjectId, TrackedObject>> {
        self.objects.lock().unwrap_or_else(|e| {
            warn!("[ObjectRegistry] Lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn publish(&self, objects: &BTreeMap<ObjectId, TrackedObject>) {
        let snapshot: GeometrySnapshot = objects
            .values()
            .filter(|o| o.has_geometry())
            .map(TrackedObject::geometry)
            .collect();
        self.geometry.store(Arc::new(snapshot));
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn add_objects(&self, ids: &[ObjectId]) -> AddReport {
        let mut report = AddReport::default();
        let mut objects = self.lock();
        for &id in ids {
            if objects.contains_key(&id) {
                report.skipped.push(id);
            } else {
                objects.insert(id, TrackedObject::new(id));
                report.added.push(id);
            }
        }
        report
    }

    pub fn remove_objects(&self, ids: &[ObjectId]) -> RemoveReport {
        let mut report = RemoveReport::default();
        let mut objects = self.lock();
        for &id in ids {
            if objects.remove(&id).is_some() {
                report.removed.push(id);
            } else {
                report.not_found.push(id);
            }
        }
        if !report.removed.is_empty() {
            self.publish(&objects);
        }
        report
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.lock().keys().copied().collect()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Feed one detector snapshot through the per-object gates.
    ///
    /// Unknown ids are created first when `auto_track` is on, otherwise
    /// ignored. Objects absent from the snapshot are left untouched.
    pub fn apply_detections(&self, snapshot: &DetectionSnapshot) -> DetectionReport {
        let mut report = DetectionReport::default();
        let mut objects = self.lock();

        for (&id, det) in snapshot {
            if !objects.contains_key(&id) {
                if !self.config.auto_track {
                    report.ignored += 1;
                    continue;
                }
                objects.insert(id, TrackedObject::new(id));
                report.created += 1;
            }
            let Some(obj) = objects.get_mut(&id) else {
                continue;
            };
            match obj.apply_detection(det, &self.config) {
                GateOutcome::Accepted => report.accepted += 1,
                outcome => {
                    report.rejected += 1;
                    debug!(id, ?outcome, streak = obj.occlusion_streak(), "Detection rejected");
                }
            }
        }

        if report.accepted > 0 || report.created > 0 {
            self.publish(&objects);
        }
        report
    }

    /// Current geometry of every object with an accepted outline. Lock-free.
    pub fn snapshot(&self) -> Arc<GeometrySnapshot> {
        self.geometry.load_full()
    }

    /// Serializable copy of every object for display.
    pub fn flat_snapshot(&self) -> BTreeMap<ObjectId, FlatObject> {
        self.lock()
            .values()
            .map(|o| {
                let has = o.has_geometry();
                (
                    o.id(),
                    FlatObject {
                        class_name: o.class_name().map(str::to_string),
                        confidence: has.then(|| o.confidence()),
                        bbox: has.then(|| o.bbox()),
                        polygon: (!o.polygon().is_empty()).then(|| o.polygon().to_vec()),
                    },
                )
            })
            .collect()
    }

    /// Gate state of one object: (version, baseline area, occlusion streak).
    pub fn gate_state(&self, id: ObjectId) -> Option<(u64, Option<f64>, u32)> {
        self.lock()
            .get(&id)
            .map(|o| (o.version(), o.baseline_area(), o.occlusion_streak()))
    }

    // ========================================================================
    // Mappings
    // ========================================================================

    /// Map a sensor of `id` to the sound at `path`.
    ///
    /// A cache miss is decoded on the blocking pool, before the object lock
    /// is taken.
    pub async fn set_mapping(&self, id: ObjectId, key: SensorKey, path: &str, volume: f32) -> Result<(), MappingError> {
        let volume = check_volume(volume)?;
        if path.trim().is_empty() {
            return Err(MappingError::EmptyPath);
        }
        if !self.contains(id) {
            return Err(MappingError::ObjectNotFound(id));
        }

        let asset = self.load_asset(path).await?;

        let mut objects = self.lock();
        let obj = objects.get_mut(&id).ok_or(MappingError::ObjectNotFound(id))?;
        obj.mappings.set(key, SoundMapping { asset, volume });
        Ok(())
    }

    async fn load_asset(&self, path: &str) -> Result<Arc<SoundAsset>, MappingError> {
        if let Some(asset) = self.assets.cached(path) {
            return Ok(asset);
        }
        let cache = Arc::clone(&self.assets);
        let owned = path.to_string();
        let asset = tokio::task::spawn_blocking(move || cache.get_or_load(&owned))
            .await
            .map_err(|e| MappingError::LoadTask(e.to_string()))??;
        Ok(asset)
    }

    pub fn set_mapping_volume(&self, id: ObjectId, key: SensorKey, volume: f32) -> Result<(), MappingError> {
        let mut objects = self.lock();
        let obj = objects.get_mut(&id).ok_or(MappingError::ObjectNotFound(id))?;
        obj.mappings.set_volume(key, volume)
    }

    /// Remove one mapping. Removing a mapping that does not exist is not an error.
    pub fn unset_mapping(&self, id: ObjectId, key: SensorKey) -> Result<(), MappingError> {
        let mut objects = self.lock();
        let obj = objects.get_mut(&id).ok_or(MappingError::ObjectNotFound(id))?;
        obj.mappings.unset(key);
        Ok(())
    }

    pub fn clear_mappings(&self, id: ObjectId) -> Result<(), MappingError> {
        let mut objects = self.lock();
        let obj = objects.get_mut(&id).ok_or(MappingError::ObjectNotFound(id))?;
        obj.mappings.clear();
        Ok(())
    }

    /// Apply many mapping edits, reporting each entry separately.
    ///
    /// A path of `"null"` unsets the entry. Fails as a whole only when the
    /// object itself does not exist.
    pub async fn bulk_set_mappings(
        &self,
        id: ObjectId,
        requests: &[MappingRequest],
    ) -> Result<Vec<MappingResult>, MappingError> {
        if !self.contains(id) {
            return Err(MappingError::ObjectNotFound(id));
        }

        let mut results = Vec::with_capacity(requests.len());
        for req in requests {
            results.push(match self.apply_request(id, req).await {
                Ok(action) => MappingResult::ok(req, action),
                Err(e) => {
                    debug!(id, error = %e, "Mapping entry rejected");
                    MappingResult::error(req, &e)
                }
            });
        }
        Ok(results)
    }

    async fn apply_request(&self, id: ObjectId, req: &MappingRequest) -> Result<MappingAction, MappingError> {
        let key = req.key()?;
        let path = req.path()?;
        if path == UNSET_PATH_SENTINEL {
            self.unset_mapping(id, key)?;
            return Ok(MappingAction::Unset);
        }
        let volume = req.volume()?;
        self.set_mapping(id, key, path, volume).await?;
        Ok(MappingAction::Set)
    }

    pub fn mappings(&self, id: ObjectId) -> Result<Vec<MappingInfo>, MappingError> {
        self.lock()
            .get(&id)
            .map(|o| o.mappings.dump())
            .ok_or(MappingError::ObjectNotFound(id))
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Resolve a bound touch event to its sound and hand it to `sink`.
    ///
    /// Only on-events with a bound, known, mapped object trigger; everything
    /// else is dropped silently.
    pub fn dispatch(&self, event: &TouchEvent, sink: &dyn TriggerSink) -> DispatchOutcome {
        if !event.is_on() {
            return DispatchOutcome::NotOn;
        }
        let Some(object_id) = event.object_id else {
            return DispatchOutcome::NoObject;
        };
        let key = event.key();

        let trigger = {
            let objects = self.lock();
            let Some(obj) = objects.get(&object_id) else {
                return DispatchOutcome::UnknownObject;
            };
            let Some(mapping) = obj.mappings.get(key) else {
                return DispatchOutcome::Unmapped;
            };
            Trigger {
                object_id,
                key,
                asset: Arc::clone(&mapping.asset),
                gain: mapping.volume,
                timestamp: event.timestamp,
            }
        };

        sink.trigger(trigger);
        DispatchOutcome::Triggered
    }
}
