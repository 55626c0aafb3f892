//! Pipeline integration tests
//!
//! Drives the whole fusion chain through a real `EngineContext`: glove
//! frames → touch events → landmark/object mapping → binding → dispatch →
//! mixer and loop recording. Sounds are synthesized by a fake loader so no
//! WAV files or audio device are needed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use touchloop::audio::{AssetError, AssetLoader, SoundAsset};
use touchloop::bridge;
use touchloop::control::{run_command_loop, Command, Controller, ScriptedSource};
use touchloop::pipeline::{run_supervisor, spawn_core_tasks, FusionStage, TaskResult};
use touchloop::{
    BBox, Detection, EngineConfig, EngineContext, Hand, HandLandmarks, Point, SensorFrame, TouchKind,
};

struct ToneLoader;

impl AssetLoader for ToneLoader {
    fn load(&self, path: &Path) -> Result<SoundAsset, AssetError> {
        Ok(SoundAsset::from_interleaved(path.to_string_lossy(), 48_000, 1, &[0.25; 4_800]))
    }
}

fn context() -> Arc<EngineContext> {
    let (ctx, _detections) = EngineContext::new(EngineConfig::default(), Arc::new(ToneLoader));
    ctx
}

fn square(x: f64, y: f64, size: f64) -> Detection {
    Detection {
        class_name: Some("block".to_string()),
        confidence: 0.9,
        polygon: vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ],
        bbox: BBox::new(x, y, size, size),
    }
}

fn landmarks_at(hand: Hand, p: Point) -> HandLandmarks {
    HandLandmarks {
        hand,
        points: [p; 7],
        timestamp: 0.0,
    }
}

fn frame(hand: Hand, timestamp: f64, sensor: usize, value: u16) -> SensorFrame {
    let mut values = [0u16; 6];
    values[sensor] = value;
    SensorFrame {
        hand,
        timestamp,
        values,
    }
}

/// Object 1 at (100, 100)-(200, 200) with right index mapped to a snare.
async fn prepare_object(ctx: &EngineContext) {
    ctx.registry.add_objects(&[1]);
    let report = ctx.registry.apply_detections(&BTreeMap::from([(1, square(100.0, 100.0, 100.0))]));
    assert_eq!(report.accepted, 1);
    ctx.registry
        .set_mapping(1, touchloop::SensorKey::new(Hand::Right, 1).unwrap(), "snare.wav", 0.8)
        .await
        .unwrap();
}

#[tokio::test]
async fn press_on_mapped_object_triggers_and_records() {
    let ctx = context();
    prepare_object(&ctx).await;
    assert!(ctx.submit_landmarks(landmarks_at(Hand::Right, Point::new(150.0, 150.0))));

    let created = ctx.scheduler.create_loop(Some("groove"));
    ctx.scheduler.select_loop(created.id).unwrap();
    ctx.scheduler.start(4, 120, 4).unwrap();

    let mut events_rx = ctx.subscribe();
    let mut stage = FusionStage::new(Hand::Right, &ctx);

    let on = stage.process(&frame(Hand::Right, 1.000, 1, 4095), &ctx);
    assert_eq!(on.len(), 1);
    assert_eq!(on[0].kind, TouchKind::On);
    assert_eq!(on[0].sensor, 1);
    assert_eq!(on[0].object_id, Some(1));
    assert_eq!(ctx.mixer.active_voices(), 1);

    // Released after two quiet frames (EMA falls below the off threshold).
    assert!(stage.process(&frame(Hand::Right, 1.020, 1, 0), &ctx).is_empty());
    let off = stage.process(&frame(Hand::Right, 1.040, 1, 0), &ctx);
    assert_eq!(off.len(), 1);
    assert_eq!(off[0].kind, TouchKind::Off);

    let published = events_rx.recv().await.unwrap();
    assert_eq!(published.kind, TouchKind::On);

    let stats = ctx.stats.snapshot();
    assert_eq!(stats.triggers, 1);
    assert_eq!(stats.recorded, 1);
    assert_eq!(stage.stats().triggered, 1);

    let recorded = ctx.scheduler.current_loop().unwrap();
    assert_eq!(recorded.events.len(), 1);
    assert!(recorded.events[0].offset_secs < 8.0);

    ctx.shutdown();
}

#[tokio::test]
async fn press_outside_objects_plays_nothing() {
    let ctx = context();
    prepare_object(&ctx).await;
    ctx.submit_landmarks(landmarks_at(Hand::Right, Point::new(20.0, 20.0)));

    let mut stage = FusionStage::new(Hand::Right, &ctx);
    let on = stage.process(&frame(Hand::Right, 1.0, 1, 4095), &ctx);
    assert_eq!(on.len(), 1);
    assert_eq!(on[0].object_id, None);
    assert_eq!(ctx.stats.snapshot().triggers, 0);
    assert_eq!(ctx.mixer.active_voices(), 0);
}

#[tokio::test]
async fn unmapped_sensor_and_idle_transport_do_not_record() {
    let ctx = context();
    prepare_object(&ctx).await;
    ctx.submit_landmarks(landmarks_at(Hand::Right, Point::new(150.0, 150.0)));
    let lp = ctx.scheduler.create_loop(None);
    ctx.scheduler.select_loop(lp.id).unwrap();

    let mut stage = FusionStage::new(Hand::Right, &ctx);
    // Thumb is not mapped.
    stage.process(&frame(Hand::Right, 1.0, 0, 4095), &ctx);
    assert_eq!(ctx.stats.snapshot().triggers, 0);

    // Mapped sensor plays, but the transport is stopped so nothing is recorded.
    stage.process(&frame(Hand::Right, 1.0, 1, 4095), &ctx);
    let stats = ctx.stats.snapshot();
    assert_eq!(stats.triggers, 1);
    assert_eq!(stats.recorded, 0);
    assert!(ctx.scheduler.current_loop().unwrap().events.is_empty());
}

#[tokio::test]
async fn core_tasks_run_until_shutdown_command() {
    let (ctx, detections) = EngineContext::new(EngineConfig::default(), Arc::new(ToneLoader));
    let cancel = CancellationToken::new();

    let (left_tx, left_rx) = bridge::channel(8);
    let (right_tx, right_rx) = bridge::channel(8);
    let mut tasks: JoinSet<TaskResult> = JoinSet::new();
    spawn_core_tasks(
        &mut tasks,
        &ctx,
        vec![(Hand::Left, left_rx), (Hand::Right, right_rx)],
        detections,
        &cancel,
    );

    let script: Vec<Command> = serde_json::from_value(json!([
        {"cmd": "add_objects", "ids": [1]},
        {"cmd": "detections", "objects": {"1": {
            "polygon": [{"x": 100, "y": 100}, {"x": 200, "y": 100}, {"x": 200, "y": 200}, {"x": 100, "y": 200}],
            "bbox": {"x": 100, "y": 100, "w": 100, "h": 100}
        }}},
        {"cmd": "set_mapping", "object_id": 1, "hand": "right", "sensor_idx": 1, "path": "snare.wav"},
        {"cmd": "status"},
        {"cmd": "shutdown"}
    ]))
    .unwrap();

    let mut out = Vec::new();
    let controller = Controller::new(Arc::clone(&ctx));
    let command_cancel = cancel.clone();
    let commands = tokio::spawn(async move {
        let result = run_command_loop(controller, ScriptedSource::new(script, 20), &mut out, command_cancel).await;
        (result, out)
    });

    let (result, out) = commands.await.unwrap();
    assert!(result.is_ok());
    let replies: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    // `detections` is applied without a reply.
    assert_eq!(replies.len(), 4);
    assert!(replies.iter().all(|r| r["ok"] == true), "{:?}", replies);
    assert_eq!(replies[3]["cmd"], "shutdown");
    assert!(cancel.is_cancelled());

    // The shutdown command cancelled the token, so the supervisor drains.
    run_supervisor(&mut tasks, cancel.clone()).await.unwrap();
    assert!(tasks.is_empty());
    assert_eq!(ctx.stats.snapshot().detections, 1);
    assert!(ctx.registry.snapshot().iter().any(|g| g.id == 1));

    drop(left_tx);
    drop(right_tx);
    ctx.shutdown();
}
