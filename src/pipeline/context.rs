//! Explicitly constructed engine context
//!
//! Everything the workers and tasks share lives here and is handed out as
//! `Arc<EngineContext>`. There are no process-wide singletons.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::{AssetLoader, SoundAsset, SoundMixer, SoundSink};
use crate::bridge::{channel, BridgeReceiver, BridgeSender, LatestQueue};
use crate::config::defaults::{METRONOME_CLICK_HZ, METRONOME_CLICK_SECS};
use crate::config::EngineConfig;
use crate::looper::{LoopError, LoopScheduler};
use crate::objects::{ObjectRegistry, Trigger, TriggerSink};
use crate::status::{Input, RuntimeStatus};
use crate::types::{DetectionSnapshot, Hand, HandLandmarks, TouchEvent};

/// Counters shown by the `status` command.
#[derive(Debug, Default)]
pub struct EngineStats {
    touch_events: AtomicU64,
    triggers: AtomicU64,
    recorded: AtomicU64,
    detections: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub touch_events: u64,
    pub triggers: u64,
    pub recorded: u64,
    pub detections: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            touch_events: self.touch_events.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
        }
    }
}

pub struct EngineContext {
    pub config: EngineConfig,
    pub status: Arc<RuntimeStatus>,
    pub registry: ObjectRegistry,
    pub mixer: SoundMixer,
    pub scheduler: LoopScheduler,
    pub stats: EngineStats,
    events: broadcast::Sender<TouchEvent>,
    landmarks: [LatestQueue<HandLandmarks>; 2],
    detections: BridgeSender<DetectionSnapshot>,
}

impl EngineContext {
    /// Build the context. The returned receiver feeds the detection task.
    pub fn new(config: EngineConfig, loader: Arc<dyn AssetLoader>) -> (Arc<Self>, BridgeReceiver<DetectionSnapshot>) {
        let status = Arc::new(RuntimeStatus::new(config.network.glove_enabled, true));
        let registry = ObjectRegistry::new(config.objects.clone(), Arc::clone(&loader));
        let mixer = SoundMixer::new(config.audio.max_voices, config.audio.block_size);

        let click = load_metronome(&config, loader.as_ref());
        let scheduler = LoopScheduler::new(&config.looper, Arc::new(mixer.clone()), Some(click));

        let (events, _) = broadcast::channel(config.bridge.event_broadcast_capacity);
        let landmarks = [
            LatestQueue::new(config.bridge.landmark_capacity),
            LatestQueue::new(config.bridge.landmark_capacity),
        ];
        let (detections, detection_rx) = channel(config.bridge.detection_capacity);

        let ctx = Arc::new(Self {
            config,
            status,
            registry,
            mixer,
            scheduler,
            stats: EngineStats::default(),
            events,
            landmarks,
            detections,
        });
        (ctx, detection_rx)
    }

    // ========================================================================
    // Vision input
    // ========================================================================

    /// Hand a detector snapshot to the detection task. Dropped while vision is off.
    pub fn submit_detections(&self, snapshot: DetectionSnapshot) -> bool {
        if !self.status.is_enabled(Input::Vision) {
            return false;
        }
        self.detections.send(snapshot).is_ok()
    }

    /// Publish the newest landmarks of one hand. Dropped while vision is off.
    pub fn submit_landmarks(&self, landmarks: HandLandmarks) -> bool {
        if !self.status.is_enabled(Input::Vision) {
            return false;
        }
        self.landmarks[landmarks.hand.index()].push(landmarks).is_some()
    }

    /// Newest landmarks of `hand`, left in place for the next reader.
    pub fn landmarks(&self, hand: Hand) -> Option<HandLandmarks> {
        self.landmarks[hand.index()].peek_latest()
    }

    pub(crate) fn note_detections(&self) {
        self.stats.detections.fetch_add(1, Ordering::Relaxed);
    }

    // ========================================================================
    // Touch events
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<TouchEvent> {
        self.events.subscribe()
    }

    /// Broadcast one bound event. Having no subscribers is fine.
    pub fn publish(&self, event: TouchEvent) {
        self.stats.touch_events.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(event);
    }

    /// Wake every blocked worker and stop playback.
    pub fn shutdown(&self) {
        self.status.shutdown();
        self.scheduler.shutdown();
        for queue in &self.landmarks {
            queue.close();
        }
    }
}

impl TriggerSink for EngineContext {
    /// Play immediately and record into the selected loop when one is armed.
    fn trigger(&self, trigger: Trigger) {
        self.stats.triggers.fetch_add(1, Ordering::Relaxed);
        self.mixer.play(Arc::clone(&trigger.asset), trigger.gain);

        let label = format!("object {} {}", trigger.object_id, trigger.key);
        match self.scheduler.record(trigger.asset, trigger.gain, Some(label)) {
            Ok(_) => {
                self.stats.recorded.fetch_add(1, Ordering::Relaxed);
            }
            Err(LoopError::NoLoopSelected | LoopError::NotPlaying | LoopError::NotConfigured) => {}
            Err(e) => debug!("[EngineContext] Not recorded: {}", e),
        }
    }
}

fn load_metronome(config: &EngineConfig, loader: &dyn AssetLoader) -> Arc<SoundAsset> {
    if let Some(path) = &config.looper.metronome_sample {
        match loader.load(path) {
            Ok(asset) => {
                info!("[EngineContext] Metronome sample: {}", path.display());
                return Arc::new(asset);
            }
            Err(e) => warn!("[EngineContext] Metronome sample unusable ({}), using built-in click", e),
        }
    }
    Arc::new(SoundAsset::click(
        config.audio.sample_rate,
        METRONOME_CLICK_HZ,
        METRONOME_CLICK_SECS,
    ))
}
