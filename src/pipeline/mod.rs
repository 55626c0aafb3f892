//! Engine pipeline
//!
//! ```text
//! UDP worker (thread, per hand) ──bridge──▶ FusionTask (per hand)
//!                                              │ TouchProcessor → Mapper → Binder
//!                                              ▼
//! vision (external) ──bridge──▶ DetectionTask  ObjectRegistry::dispatch
//!                                  │              │ play now   │ record
//!                                  ▼              ▼            ▼
//!                            ObjectRegistry    SoundMixer ◀── LoopScheduler
//! ```
//!
//! All tasks run on one current-thread runtime under a `JoinSet`
//! supervisor; a failing or panicking task cancels the rest.

pub mod context;
pub mod detection_task;
pub mod fusion_task;

pub use context::{EngineContext, EngineStats, StatsSnapshot};
pub use detection_task::run_detection_ingest;
pub use fusion_task::{run_fusion, FusionStage, FusionStats};

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bridge::BridgeReceiver;
use crate::types::{DetectionSnapshot, Hand, SensorFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    Fusion(Hand),
    DetectionIngest,
    Commands,
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskName::Fusion(hand) => write!(f, "FusionTask:{}", hand),
            TaskName::DetectionIngest => write!(f, "DetectionTask"),
            TaskName::Commands => write!(f, "CommandTask"),
        }
    }
}

/// Task failures surfaced to the supervisor
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{task} failed: {message}")]
    Failed { task: TaskName, message: String },

    #[error("task panicked: {0}")]
    Panicked(String),
}

pub type TaskResult = Result<TaskName, TaskError>;

/// Spawn the fusion tasks (one per glove receiver) and the detection task.
pub fn spawn_core_tasks(
    task_set: &mut JoinSet<TaskResult>,
    ctx: &Arc<EngineContext>,
    gloves: Vec<(Hand, BridgeReceiver<SensorFrame>)>,
    detections: BridgeReceiver<DetectionSnapshot>,
    cancel: &CancellationToken,
) {
    for (hand, frames) in gloves {
        let ctx = Arc::clone(ctx);
        let cancel = cancel.clone();
        task_set.spawn(async move {
            run_fusion(ctx, hand, frames, cancel).await;
            Ok(TaskName::Fusion(hand))
        });
    }

    let ctx = Arc::clone(ctx);
    let cancel = cancel.clone();
    task_set.spawn(async move {
        run_detection_ingest(ctx, detections, cancel).await;
        Ok(TaskName::DetectionIngest)
    });
}

/// Monitor tasks until cancellation or until all finish; cancel on failure.
pub async fn run_supervisor(task_set: &mut JoinSet<TaskResult>, cancel: CancellationToken) -> Result<(), TaskError> {
    info!("[Supervisor] {} tasks spawned, monitoring", task_set.len());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[Supervisor] Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task))) => {
                        info!("[Supervisor] Task {} completed normally", task);
                    }
                    Some(Ok(Err(e))) => {
                        error!("[Supervisor] Task failed: {}", e);
                        cancel.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("[Supervisor] Task panicked: {}", e);
                        cancel.cancel();
                        return Err(TaskError::Panicked(e.to_string()));
                    }
                    None => {
                        info!("[Supervisor] All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks observe the token and wind down.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task)) = result {
            info!("[Supervisor] Task {} stopped", task);
        }
    }
    Ok(())
}
