//! Per-object sound mappings: (hand, sensor) → sound + volume

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::{AssetError, SoundAsset};
use crate::config::defaults::{MAX_MAPPING_VOLUME, MIN_MAPPING_VOLUME};
use crate::types::{Hand, ObjectId, SensorKey};

/// Mapping errors
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    #[error("no mapping for {0}")]
    MappingNotFound(SensorKey),

    #[error("hand must be 'left' or 'right'")]
    InvalidHand,

    #[error("sensor_idx must be an integer in [0, 7)")]
    InvalidSensor,

    #[error("path must be a non-empty string")]
    EmptyPath,

    #[error("volume must be a number between {MIN_MAPPING_VOLUME} and {MAX_MAPPING_VOLUME}")]
    InvalidVolume,

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("asset load task failed: {0}")]
    LoadTask(String),
}

/// Validate a mapping volume.
pub fn check_volume(volume: f32) -> Result<f32, MappingError> {
    if volume.is_finite() && (MIN_MAPPING_VOLUME..=MAX_MAPPING_VOLUME).contains(&volume) {
        Ok(volume)
    } else {
        Err(MappingError::InvalidVolume)
    }
}

/// One sensor's sound.
#[derive(Debug, Clone)]
pub struct SoundMapping {
    pub asset: Arc<SoundAsset>,
    pub volume: f32,
}

/// Serializable view of one mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingInfo {
    pub hand: Hand,
    pub sensor_idx: u8,
    pub path: String,
    pub volume: f32,
}

#[derive(Debug, Default)]
pub struct MappingTable {
    entries: BTreeMap<SensorKey, SoundMapping>,
}

impl MappingTable {
    pub fn set(&mut self, key: SensorKey, mapping: SoundMapping) -> Option<SoundMapping> {
        self.entries.insert(key, mapping)
    }

    pub fn unset(&mut self, key: SensorKey) -> Option<SoundMapping> {
        self.entries.remove(&key)
    }

    pub fn set_volume(&mut self, key: SensorKey, volume: f32) -> Result<(), MappingError> {
        let volume = check_volume(volume)?;
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(MappingError::MappingNotFound(key))?;
        entry.volume = volume;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, key: SensorKey) -> Option<&SoundMapping> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dump(&self) -> Vec<MappingInfo> {
        self.entries
            .iter()
            .map(|(key, m)| MappingInfo {
                hand: key.hand,
                sensor_idx: key.sensor,
                path: m.asset.path().to_string(),
                volume: m.volume,
            })
            .collect()
    }
}

// ============================================================================
// Bulk requests
// ============================================================================

/// One entry of a bulk mapping update.
///
/// Fields are loosely typed so that one malformed entry is reported on its
/// own instead of failing the whole batch at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingRequest {
    #[serde(default)]
    pub hand: Option<serde_json::Value>,
    #[serde(default)]
    pub sensor_idx: Option<serde_json::Value>,
    #[serde(default)]
    pub path: Option<serde_json::Value>,
    #[serde(default)]
    pub volume: Option<serde_json::Value>,
}

impl MappingRequest {
    pub fn new(hand: Hand, sensor_idx: u8, path: &str, volume: f32) -> Self {
        Self {
            hand: Some(hand.as_str().into()),
            sensor_idx: Some(sensor_idx.into()),
            path: Some(path.into()),
            volume: Some(volume.into()),
        }
    }

    pub fn key(&self) -> Result<SensorKey, MappingError> {
        let hand: Hand = self
            .hand
            .as_ref()
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or(MappingError::InvalidHand)?;
        let sensor = self
            .sensor_idx
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or(MappingError::InvalidSensor)?;
        SensorKey::new(hand, sensor).ok_or(MappingError::InvalidSensor)
    }

    pub fn path(&self) -> Result<&str, MappingError> {
        self.path
            .as_ref()
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or(MappingError::EmptyPath)
    }

    /// Volume defaults to 1.0 when omitted.
    pub fn volume(&self) -> Result<f32, MappingError> {
        match &self.volume {
            None | Some(serde_json::Value::Null) => Ok(1.0),
            Some(v) => v
                .as_f64()
                .ok_or(MappingError::InvalidVolume)
                .and_then(|f| check_volume(f as f32)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Ok,
    Error,
}

/// What a successful bulk entry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingAction {
    Set,
    Unset,
}

/// Per-entry result of a bulk update, echoing the request.
#[derive(Debug, Clone, Serialize)]
pub struct MappingResult {
    pub hand: Option<serde_json::Value>,
    pub sensor_idx: Option<serde_json::Value>,
    pub path: Option<serde_json::Value>,
    pub volume: Option<serde_json::Value>,
    pub status: MappingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<MappingAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MappingResult {
    pub fn ok(req: &MappingRequest, action: MappingAction) -> Self {
        Self::from_request(req, MappingStatus::Ok, Some(action), None)
    }

    pub fn error(req: &MappingRequest, err: &MappingError) -> Self {
        Self::from_request(req, MappingStatus::Error, None, Some(err.to_string()))
    }

    fn from_request(
        req: &MappingRequest,
        status: MappingStatus,
        action: Option<MappingAction>,
        reason: Option<String>,
    ) -> Self {
        Self {
            hand: req.hand.clone(),
            sensor_idx: req.sensor_idx.clone(),
            path: req.path.clone(),
            volume: req.volume.clone(),
            status,
            action,
            reason,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == MappingStatus::Ok
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// A resolved sound trigger produced by dispatching a bound on-event.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub object_id: ObjectId,
    pub key: SensorKey,
    pub asset: Arc<SoundAsset>,
    pub gain: f32,
    /// Board timestamp of the touch.
    pub timestamp: f64,
}

/// Receives resolved triggers (plays them, records them, ...).
pub trait TriggerSink: Send + Sync {
    fn trigger(&self, trigger: Trigger);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req(value: serde_json::Value) -> MappingRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_validation() {
        let ok = req(json!({"hand": "left", "sensor_idx": 3, "path": "kick.wav", "volume": 1.5}));
        assert_eq!(ok.key().unwrap(), SensorKey { hand: Hand::Left, sensor: 3 });
        assert_eq!(ok.path().unwrap(), "kick.wav");
        assert_eq!(ok.volume().unwrap(), 1.5);

        let bad_hand = req(json!({"hand": "middle", "sensor_idx": 0, "path": "a.wav"}));
        assert!(matches!(bad_hand.key(), Err(MappingError::InvalidHand)));

        let bad_sensor = req(json!({"hand": "right", "sensor_idx": 9, "path": "a.wav"}));
        assert!(matches!(bad_sensor.key(), Err(MappingError::InvalidSensor)));

        let str_sensor = req(json!({"hand": "right", "sensor_idx": "1", "path": "a.wav"}));
        assert!(matches!(str_sensor.key(), Err(MappingError::InvalidSensor)));

        let blank = req(json!({"hand": "right", "sensor_idx": 1, "path": "  "}));
        assert!(matches!(blank.path(), Err(MappingError::EmptyPath)));

        let loud = req(json!({"hand": "right", "sensor_idx": 1, "path": "a.wav", "volume": 2.5}));
        assert!(matches!(loud.volume(), Err(MappingError::InvalidVolume)));

        let default_volume = req(json!({"hand": "right", "sensor_idx": 1, "path": "a.wav"}));
        assert_eq!(default_volume.volume().unwrap(), 1.0);
    }

    #[test]
    fn test_table_set_volume_and_dump() {
        let mut table = MappingTable::default();
        let key = SensorKey { hand: Hand::Right, sensor: 0 };
        let asset = Arc::new(SoundAsset::from_interleaved("snare.wav", 48_000, 1, &[0.0; 4]));
        table.set(key, SoundMapping { asset, volume: 1.0 });

        table.set_volume(key, 0.4).unwrap();
        assert!(matches!(table.set_volume(key, -1.0), Err(MappingError::InvalidVolume)));

        let dump = table.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].path, "snare.wav");
        assert_eq!(dump[0].volume, 0.4);

        let missing = SensorKey { hand: Hand::Left, sensor: 0 };
        assert!(matches!(table.set_volume(missing, 1.0), Err(MappingError::MappingNotFound(_))));
    }

    #[test]
    fn test_result_serialization_echoes_request() {
        let r = req(json!({"hand": "left", "sensor_idx": 1, "path": "x.wav"}));
        let json = serde_json::to_value(MappingResult::error(&r, &MappingError::EmptyPath)).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["hand"], "left");
        assert!(json["reason"].as_str().unwrap().contains("path"));
    }
}
