//! Applies control commands to the engine context

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::commands::{Command, Reply};
use crate::config::defaults::DEFAULT_BEATS_PER_BAR;
use crate::looper::LoopError;
use crate::objects::MappingError;
use crate::pipeline::EngineContext;
use crate::types::{DetectionSnapshot, Hand, ObjectId, SensorKey};

/// Control errors
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("invalid object id '{0}'")]
    InvalidObjectId(String),

    #[error("failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What the command loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply(Reply),
    /// Applied; nothing to send back.
    Silent,
    Shutdown(Reply),
}

pub struct Controller {
    ctx: Arc<EngineContext>,
}

impl Controller {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Apply one command, turning any failure into an error reply.
    pub async fn handle(&self, command: Command) -> Outcome {
        let name = command.name();
        let silent = command.is_silent();
        let shutdown = matches!(command, Command::Shutdown);

        match self.apply(command).await {
            Ok(_) if silent => Outcome::Silent,
            Ok(result) if shutdown => Outcome::Shutdown(Reply::ok(name, result)),
            Ok(result) => Outcome::Reply(Reply::ok(name, result)),
            Err(e) => {
                debug!(cmd = name, error = %e, "Command rejected");
                Outcome::Reply(Reply::error(name, e))
            }
        }
    }

    /// Apply one command and return its JSON result.
    ///
    /// Mapping commands may wait on an asset decode; nothing else awaits.
    pub async fn apply(&self, command: Command) -> Result<Value, ControlError> {
        let ctx = &self.ctx;
        let scheduler = &ctx.scheduler;
        let registry = &ctx.registry;

        match command {
            // ----------------------------------------------------------------
            // Transport
            // ----------------------------------------------------------------
            Command::TransportStart {
                bars,
                bpm,
                beats_per_bar,
            } => to_json(scheduler.start(bars, bpm, beats_per_bar.unwrap_or(DEFAULT_BEATS_PER_BAR))?),
            Command::TransportToggle { playing } => to_json(scheduler.toggle(playing)?),
            Command::TransportState => to_json(scheduler.transport_state()),

            // ----------------------------------------------------------------
            // Loops
            // ----------------------------------------------------------------
            Command::CreateLoop { name } => to_json(scheduler.create_loop(name.as_deref())),
            Command::ListLoops => to_json(scheduler.list_loops()),
            Command::GetLoop { loop_id } => {
                to_json(scheduler.get_loop(loop_id).ok_or(LoopError::LoopNotFound(loop_id))?)
            }
            Command::SelectLoop { loop_id } => to_json(scheduler.select_loop(loop_id)?),
            Command::DeselectLoop => {
                scheduler.deselect_loop();
                Ok(json!({ "current_loop_id": null }))
            }
            Command::CurrentLoop => to_json(scheduler.current_loop()),
            Command::ToggleLoop { loop_id, active } => to_json(scheduler.toggle_loop(loop_id, active)?),
            Command::ClearLoop { loop_id } => to_json(scheduler.clear_loop(loop_id)?),
            Command::DeleteLoop { loop_id } => {
                if !scheduler.delete_loop(loop_id) {
                    return Err(LoopError::LoopNotFound(loop_id).into());
                }
                Ok(json!({ "deleted": loop_id }))
            }

            // ----------------------------------------------------------------
            // Metronome
            // ----------------------------------------------------------------
            Command::ToggleMetronome { enabled } => to_json(scheduler.toggle_metronome(enabled)),
            Command::MetronomeState => to_json(scheduler.metronome_state()),

            // ----------------------------------------------------------------
            // Objects and mappings
            // ----------------------------------------------------------------
            Command::AddObjects { ids } => {
                let report = registry.add_objects(&ids);
                info!("[Controller] Objects added: {:?}", report.added);
                to_json(report)
            }
            Command::RemoveObjects { ids } => to_json(registry.remove_objects(&ids)),
            Command::Objects => to_json(registry.flat_snapshot()),
            Command::SetMapping {
                object_id,
                hand,
                sensor_idx,
                path,
                volume,
            } => {
                let key = sensor_key(hand, sensor_idx)?;
                registry.set_mapping(object_id, key, &path, volume.unwrap_or(1.0)).await?;
                to_json(registry.mappings(object_id)?)
            }
            Command::SetMappingVolume {
                object_id,
                hand,
                sensor_idx,
                volume,
            } => {
                registry.set_mapping_volume(object_id, sensor_key(hand, sensor_idx)?, volume)?;
                to_json(registry.mappings(object_id)?)
            }
            Command::UnsetMapping {
                object_id,
                hand,
                sensor_idx,
            } => {
                registry.unset_mapping(object_id, sensor_key(hand, sensor_idx)?)?;
                to_json(registry.mappings(object_id)?)
            }
            Command::ClearMappings { object_id } => {
                registry.clear_mappings(object_id)?;
                Ok(json!({ "object_id": object_id, "mappings": [] }))
            }
            Command::BulkSetMappings { object_id, mappings } => {
                to_json(registry.bulk_set_mappings(object_id, &mappings).await?)
            }
            Command::Mappings { object_id } => to_json(registry.mappings(object_id)?),

            // ----------------------------------------------------------------
            // Vision feed
            // ----------------------------------------------------------------
            Command::Detections { objects } => {
                let snapshot = objects
                    .into_iter()
                    .map(|(id, det)| {
                        id.trim()
                            .parse::<ObjectId>()
                            .map(|id| (id, det))
                            .map_err(|_| ControlError::InvalidObjectId(id))
                    })
                    .collect::<Result<DetectionSnapshot, _>>()?;
                Ok(json!({ "queued": ctx.submit_detections(snapshot) }))
            }
            Command::Hands { hands } => {
                let accepted = hands.into_iter().map(|lm| ctx.submit_landmarks(lm)).filter(|ok| *ok).count();
                Ok(json!({ "accepted": accepted }))
            }

            // ----------------------------------------------------------------
            // Runtime
            // ----------------------------------------------------------------
            Command::SetInput { input, enabled } => {
                ctx.status.set_enabled(input, enabled);
                info!("[Controller] {:?} input {}", input, if enabled { "enabled" } else { "disabled" });
                to_json(ctx.status.snapshot())
            }
            Command::Status => Ok(json!({
                "runtime": ctx.status.snapshot(),
                "stats": ctx.stats.snapshot(),
                "transport": scheduler.transport_state(),
                "active_voices": ctx.mixer.active_voices(),
                "objects": registry.object_ids(),
            })),
            Command::Shutdown => Ok(json!({ "shutting_down": true })),
        }
    }
}

fn sensor_key(hand: Hand, sensor_idx: u8) -> Result<SensorKey, MappingError> {
    SensorKey::new(hand, usize::from(sensor_idx)).ok_or(MappingError::InvalidSensor)
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ControlError> {
    Ok(serde_json::to_value(value)?)
}
