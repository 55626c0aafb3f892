//! Detector snapshot ingestion
//!
//! The vision process runs on its own thread(s) and pushes snapshots
//! through the thread bridge; this task applies only the newest one to the
//! registry, which republishes the geometry snapshot for the fusion tasks.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::context::EngineContext;
use crate::bridge::BridgeReceiver;
use crate::types::DetectionSnapshot;

pub async fn run_detection_ingest(
    ctx: Arc<EngineContext>,
    mut snapshots: BridgeReceiver<DetectionSnapshot>,
    cancel: CancellationToken,
) -> u64 {
    info!("[DetectionTask] Started");
    let mut applied = 0u64;

    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            snapshot = snapshots.recv_latest() => match snapshot {
                Some(snapshot) => snapshot,
                None => break,
            }
        };

        let report = ctx.registry.apply_detections(&snapshot);
        ctx.note_detections();
        applied += 1;
        debug!(
            accepted = report.accepted,
            rejected = report.rejected,
            created = report.created,
            "[DetectionTask] Snapshot applied"
        );
    }

    info!(
        "[DetectionTask] Stopped ({} snapshots applied, {} superseded)",
        applied,
        snapshots.dropped()
    );
    applied
}
