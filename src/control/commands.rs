//! Control commands and replies
//!
//! One JSON object per line, tagged by `cmd`:
//!
//! ```json
//! {"cmd": "transport_start", "bars": 4, "bpm": 120}
//! {"cmd": "set_mapping", "object_id": 3, "hand": "left", "sensor_idx": 1, "path": "kick.wav"}
//! {"cmd": "detections", "objects": {"3": {"bbox": {"x": 0, "y": 0, "w": 10, "h": 10}}}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::objects::MappingRequest;
use crate::status::Input;
use crate::types::{Detection, Hand, HandLandmarks, ObjectId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    // Transport
    TransportStart {
        bars: u32,
        bpm: u32,
        #[serde(default)]
        beats_per_bar: Option<u32>,
    },
    TransportToggle {
        playing: bool,
    },
    TransportState,

    // Loops
    CreateLoop {
        #[serde(default)]
        name: Option<String>,
    },
    ListLoops,
    GetLoop {
        loop_id: Uuid,
    },
    SelectLoop {
        loop_id: Uuid,
    },
    DeselectLoop,
    CurrentLoop,
    ToggleLoop {
        loop_id: Uuid,
        active: bool,
    },
    ClearLoop {
        loop_id: Uuid,
    },
    DeleteLoop {
        loop_id: Uuid,
    },

    // Metronome
    ToggleMetronome {
        enabled: bool,
    },
    MetronomeState,

    // Objects
    AddObjects {
        ids: Vec<ObjectId>,
    },
    RemoveObjects {
        ids: Vec<ObjectId>,
    },
    Objects,

    // Mappings
    SetMapping {
        object_id: ObjectId,
        hand: Hand,
        sensor_idx: u8,
        path: String,
        #[serde(default)]
        volume: Option<f32>,
    },
    SetMappingVolume {
        object_id: ObjectId,
        hand: Hand,
        sensor_idx: u8,
        volume: f32,
    },
    UnsetMapping {
        object_id: ObjectId,
        hand: Hand,
        sensor_idx: u8,
    },
    ClearMappings {
        object_id: ObjectId,
    },
    BulkSetMappings {
        object_id: ObjectId,
        mappings: Vec<MappingRequest>,
    },
    Mappings {
        object_id: ObjectId,
    },

    // Vision input from the external detector. Keys are track ids; they
    // stay strings here because tagged enums cannot read integer map keys.
    Detections {
        objects: BTreeMap<String, Detection>,
    },
    Hands {
        hands: Vec<HandLandmarks>,
    },

    // Runtime
    SetInput {
        input: Input,
        enabled: bool,
    },
    Status,
    Shutdown,
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::TransportStart { .. } => "transport_start",
            Command::TransportToggle { .. } => "transport_toggle",
            Command::TransportState => "transport_state",
            Command::CreateLoop { .. } => "create_loop",
            Command::ListLoops => "list_loops",
            Command::GetLoop { .. } => "get_loop",
            Command::SelectLoop { .. } => "select_loop",
            Command::DeselectLoop => "deselect_loop",
            Command::CurrentLoop => "current_loop",
            Command::ToggleLoop { .. } => "toggle_loop",
            Command::ClearLoop { .. } => "clear_loop",
            Command::DeleteLoop { .. } => "delete_loop",
            Command::ToggleMetronome { .. } => "toggle_metronome",
            Command::MetronomeState => "metronome_state",
            Command::AddObjects { .. } => "add_objects",
            Command::RemoveObjects { .. } => "remove_objects",
            Command::Objects => "objects",
            Command::SetMapping { .. } => "set_mapping",
            Command::SetMappingVolume { .. } => "set_mapping_volume",
            Command::UnsetMapping { .. } => "unset_mapping",
            Command::ClearMappings { .. } => "clear_mappings",
            Command::BulkSetMappings { .. } => "bulk_set_mappings",
            Command::Mappings { .. } => "mappings",
            Command::Detections { .. } => "detections",
            Command::Hands { .. } => "hands",
            Command::SetInput { .. } => "set_input",
            Command::Status => "status",
            Command::Shutdown => "shutdown",
        }
    }

    /// High-rate vision feeds are not acknowledged.
    pub fn is_silent(&self) -> bool {
        matches!(self, Command::Detections { .. } | Command::Hands { .. })
    }
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub cmd: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(cmd: &str, result: serde_json::Value) -> Self {
        Self {
            cmd: cmd.to_string(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(cmd: &str, error: impl ToString) -> Self {
        Self {
            cmd: cmd.to_string(),
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_transport_start_defaults() {
        let cmd: Command = serde_json::from_value(json!({"cmd": "transport_start", "bars": 4, "bpm": 120})).unwrap();
        assert_eq!(
            cmd,
            Command::TransportStart {
                bars: 4,
                bpm: 120,
                beats_per_bar: None
            }
        );
        assert_eq!(cmd.name(), "transport_start");
    }

    #[test]
    fn test_parse_detections_with_string_keys() {
        let cmd: Command = serde_json::from_value(json!({
            "cmd": "detections",
            "objects": {
                "7": {
                    "class_name": "cup",
                    "confidence": 0.9,
                    "polygon": [{"x": 0.0, "y": 0.0}, {"x": 4.0, "y": 0.0}, {"x": 4.0, "y": 4.0}],
                    "bbox": {"x": 0.0, "y": 0.0, "w": 4.0, "h": 4.0}
                }
            }
        }))
        .unwrap();
        let Command::Detections { objects } = cmd else {
            panic!("wrong variant");
        };
        assert_eq!(objects["7"].polygon.len(), 3);
        assert!(Command::Detections { objects }.is_silent());
    }

    #[test]
    fn test_parse_set_input() {
        let cmd: Command = serde_json::from_str(r#"{"cmd":"set_input","input":"glove","enabled":false}"#).unwrap();
        assert_eq!(
            cmd,
            Command::SetInput {
                input: Input::Glove,
                enabled: false
            }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"cmd":"explode"}"#).is_err());
    }

    #[test]
    fn test_reply_shape() {
        let reply = serde_json::to_value(Reply::error("select_loop", "loop not found")).unwrap();
        assert_eq!(reply, json!({"cmd": "select_loop", "ok": false, "error": "loop not found"}));
    }
}
