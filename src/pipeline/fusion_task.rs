//! Per-hand fusion: sensor frames → bound touch events → sounds
//!
//! One task per hand, so each hand's frames are handled in arrival order
//! and the hands never wait on each other. For every frame:
//!
//! ```text
//! TouchProcessor ─▶ ObjectMapper (landmarks + geometry snapshot)
//!                ─▶ ObjectBinder ─▶ ObjectRegistry::dispatch ─▶ broadcast
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::context::EngineContext;
use crate::bridge::BridgeReceiver;
use crate::fusion::{ObjectBinder, ObjectMapper};
use crate::objects::DispatchOutcome;
use crate::touch::TouchProcessor;
use crate::types::{Hand, SensorFrame, TouchEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FusionStats {
    pub frames: u64,
    pub events: u64,
    pub triggered: u64,
}

/// The synchronous per-hand pipeline state.
pub struct FusionStage {
    hand: Hand,
    processor: TouchProcessor,
    mapper: ObjectMapper,
    binder: ObjectBinder,
    stats: FusionStats,
}

impl FusionStage {
    pub fn new(hand: Hand, ctx: &EngineContext) -> Self {
        Self {
            hand,
            processor: TouchProcessor::new(ctx.config.touch.clone()),
            mapper: ObjectMapper::new(),
            binder: ObjectBinder::new(ctx.config.binder.dwell_ms),
            stats: FusionStats::default(),
        }
    }

    pub fn hand(&self) -> Hand {
        self.hand
    }

    pub fn stats(&self) -> FusionStats {
        self.stats
    }

    /// Run one frame through the whole chain and return the bound events.
    pub fn process(&mut self, frame: &SensorFrame, ctx: &EngineContext) -> Vec<TouchEvent> {
        self.stats.frames += 1;
        let mut events = self.processor.process_frame(frame);
        if events.is_empty() {
            return events;
        }

        let landmarks = ctx.landmarks(self.hand);
        let geometry = ctx.registry.snapshot();
        self.mapper.map_events(&mut events, landmarks.as_ref(), &geometry);
        self.binder.bind_events(&mut events);

        for event in &events {
            let outcome = ctx.registry.dispatch(event, ctx);
            if outcome == DispatchOutcome::Triggered {
                self.stats.triggered += 1;
            }
            debug!(
                hand = %self.hand,
                sensor = event.sensor,
                kind = ?event.kind,
                object = ?event.object_id,
                ?outcome,
                "Touch event"
            );
            ctx.publish(event.clone());
        }
        self.stats.events += events.len() as u64;
        events
    }
}

/// Drive one hand's stage from its glove bridge until cancelled or the
/// worker side goes away.
pub async fn run_fusion(
    ctx: Arc<EngineContext>,
    hand: Hand,
    mut frames: BridgeReceiver<SensorFrame>,
    cancel: CancellationToken,
) -> FusionStats {
    let mut stage = FusionStage::new(hand, &ctx);
    info!("[FusionTask:{}] Started", hand);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                info!("[FusionTask:{}] Shutdown signal received", hand);
                break;
            }
            frame = frames.recv_latest() => match frame {
                Some(frame) => frame,
                None => {
                    info!("[FusionTask:{}] Glove bridge closed", hand);
                    break;
                }
            }
        };
        stage.process(&frame, &ctx);
    }

    let stats = stage.stats();
    info!(
        "[FusionTask:{}] Stopped ({} frames, {} events, {} triggered, {} frames superseded)",
        hand,
        stats.frames,
        stats.events,
        stats.triggered,
        frames.dropped()
    );
    stats
}
