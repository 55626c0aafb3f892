//! Boundary scheduling of loop events and metronome ticks
//!
//! A single scheduling task tracks the cycle index. `prefetch` before each
//! boundary it schedules the whole upcoming cycle at once: every event of
//! every active loop plus one metronome tick per beat. Payloads whose target
//! times round to the same coalescing bin share one timer task. Timers wake
//! `microspin` early and finish with [`precise_wait`].
//!
//! Every start or restart bumps a run generation; a timer belonging to an
//! older generation finds nothing to fire.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::library::{LoopEvent, LoopInfo, LoopLibrary};
use super::precise_wait::precise_wait;
use super::transport::{cycle_index, cycle_start, fire_time, record_offset, Transport, TransportSettings, TransportState};
use super::LoopError;
use crate::audio::{SoundAsset, SoundSink};
use crate::config::LooperConfig;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MetronomeTick {
    pub cycle: u64,
    /// Beat number within the cycle.
    pub beat: u32,
    pub bar: u32,
    pub beat_in_bar: u32,
    pub strong: bool,
    /// Zero when the metronome was muted at scheduling time.
    pub gain: f32,
}

#[derive(Debug, Clone)]
pub struct LoopEventFire {
    pub loop_id: Uuid,
    pub event_id: Uuid,
    pub label: Option<String>,
    pub asset: Arc<SoundAsset>,
    pub gain: f32,
}

/// What a timer plays when it fires.
#[derive(Debug, Clone)]
pub enum ScheduledPayload {
    MetronomeTick(MetronomeTick),
    LoopEventFire(LoopEventFire),
}

impl ScheduledPayload {
    fn loop_id(&self) -> Option<Uuid> {
        match self {
            ScheduledPayload::MetronomeTick(_) => None,
            ScheduledPayload::LoopEventFire(fire) => Some(fire.loop_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetronomeState {
    pub enabled: bool,
    pub sound_loaded: bool,
}

// ============================================================================
// Shared state
// ============================================================================

struct Timing {
    prefetch: Duration,
    coalesce_secs: f64,
    microspin: Duration,
    strong_volume: f32,
    weak_volume: f32,
}

impl Timing {
    fn from_config(config: &LooperConfig) -> Self {
        Self {
            prefetch: Duration::from_secs_f64(config.prefetch_ms.max(0.0) / 1000.0),
            coalesce_secs: (config.coalesce_ms / 1000.0).max(1e-6),
            microspin: Duration::from_secs_f64(config.microspin_ms.max(0.0) / 1000.0),
            strong_volume: config.metronome_strong_volume,
            weak_volume: config.metronome_weak_volume,
        }
    }
}

/// Payloads sharing one timer.
struct Bin {
    payloads: Vec<ScheduledPayload>,
    timer: AbortHandle,
}

struct SchedulerState {
    transport: Transport,
    library: LoopLibrary,
    metronome_enabled: bool,
    generation: u64,
    runtime: Option<Handle>,
    run: Option<CancellationToken>,
    scheduled_cycles: BTreeSet<u64>,
    bins: HashMap<i64, Bin>,
    by_loop: HashMap<Uuid, BTreeSet<i64>>,
}

impl SchedulerState {
    /// Cancel the scheduling task and every pending timer.
    fn stop_run(&mut self) {
        if let Some(token) = self.run.take() {
            token.cancel();
        }
        for (_, bin) in self.bins.drain() {
            bin.timer.abort();
        }
        self.by_loop.clear();
        self.scheduled_cycles.clear();
    }

    /// Drop a loop's payloads from pending bins, aborting bins left empty.
    fn cancel_loop(&mut self, loop_id: Uuid) {
        let Some(keys) = self.by_loop.remove(&loop_id) else {
            return;
        };
        for key in keys {
            let Some(bin) = self.bins.get_mut(&key) else {
                continue;
            };
            bin.payloads.retain(|p| p.loop_id() != Some(loop_id));
            if bin.payloads.is_empty() {
                bin.timer.abort();
                self.bins.remove(&key);
            }
        }
    }

    fn take_bin(&mut self, generation: u64, key: i64) -> Vec<ScheduledPayload> {
        if generation != self.generation {
            return Vec::new();
        }
        let Some(bin) = self.bins.remove(&key) else {
            return Vec::new();
        };
        for keys in self.by_loop.values_mut() {
            keys.remove(&key);
        }
        bin.payloads
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    sink: Arc<dyn SoundSink>,
    metronome: Option<Arc<SoundAsset>>,
    timing: Timing,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("[LoopScheduler] Lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Queue `payload` for `when`, joining an existing bin when one matches.
    fn launch_at(self: &Arc<Self>, st: &mut SchedulerState, epoch: Instant, when: Instant, payload: ScheduledPayload) {
        let Some(runtime) = st.runtime.clone() else {
            return;
        };
        let key = (when.saturating_duration_since(epoch).as_secs_f64() / self.timing.coalesce_secs).round() as i64;
        if let Some(loop_id) = payload.loop_id() {
            st.by_loop.entry(loop_id).or_default().insert(key);
        }

        if let Some(bin) = st.bins.get_mut(&key) {
            bin.payloads.push(payload);
            return;
        }

        let timer = runtime.spawn(fire_bin(Arc::clone(self), st.generation, key, when));
        st.bins.insert(
            key,
            Bin {
                payloads: vec![payload],
                timer: timer.abort_handle(),
            },
        );
    }

    /// Schedule every payload of `cycle` once per run.
    fn schedule_cycle(self: &Arc<Self>, generation: u64, cycle: u64) {
        let mut st = self.lock();
        if st.generation != generation {
            return;
        }
        let Some((epoch, len, settings)) = st.transport.running_clock() else {
            return;
        };
        if !st.scheduled_cycles.insert(cycle) {
            return;
        }
        st.scheduled_cycles.retain(|&c| c + 2 > cycle);

        let start = cycle_start(epoch, len, cycle);
        let mut payloads = Vec::new();

        if self.metronome.is_some() {
            let beat_secs = settings.beat_secs();
            for beat in 0..settings.total_beats() {
                let strong = beat % settings.beats_per_bar == 0;
                let gain = match (st.metronome_enabled, strong) {
                    (false, _) => 0.0,
                    (true, true) => self.timing.strong_volume,
                    (true, false) => self.timing.weak_volume,
                };
                let when = start + Duration::from_secs_f64(f64::from(beat) * beat_secs);
                payloads.push((
                    when,
                    ScheduledPayload::MetronomeTick(MetronomeTick {
                        cycle,
                        beat,
                        bar: beat / settings.beats_per_bar,
                        beat_in_bar: beat % settings.beats_per_bar,
                        strong,
                        gain,
                    }),
                ));
            }
        }

        for lp in st.library.active() {
            for ev in &lp.events {
                payloads.push((fire_time(epoch, len, cycle, ev.offset_secs), loop_payload(lp.id, ev)));
            }
        }

        let count = payloads.len();
        for (when, payload) in payloads {
            self.launch_at(&mut st, epoch, when, payload);
        }
        trace!(cycle, payloads = count, bins = st.bins.len(), "Cycle scheduled");
    }

    /// Add `events` of `loop_id` to cycles that were scheduled before they existed.
    fn schedule_late(self: &Arc<Self>, st: &mut SchedulerState, loop_id: Uuid, events: &[LoopEvent]) {
        let Some((epoch, len, _)) = st.transport.running_clock() else {
            return;
        };
        let now = Instant::now();
        let cycles: Vec<u64> = st.scheduled_cycles.iter().copied().collect();
        for cycle in cycles {
            for ev in events {
                let when = fire_time(epoch, len, cycle, ev.offset_secs);
                if when > now {
                    self.launch_at(st, epoch, when, loop_payload(loop_id, ev));
                }
            }
        }
    }

    fn play(&self, payload: ScheduledPayload) {
        match payload {
            ScheduledPayload::MetronomeTick(tick) => {
                if tick.gain <= 0.0 {
                    return;
                }
                if let Some(click) = &self.metronome {
                    self.sink.play(Arc::clone(click), tick.gain);
                }
            }
            ScheduledPayload::LoopEventFire(fire) => {
                self.sink.play(fire.asset, fire.gain);
            }
        }
    }
}

fn loop_payload(loop_id: Uuid, ev: &LoopEvent) -> ScheduledPayload {
    ScheduledPayload::LoopEventFire(LoopEventFire {
        loop_id,
        event_id: ev.id,
        label: ev.label.clone(),
        asset: Arc::clone(&ev.asset),
        gain: ev.gain,
    })
}

/// One coalescing bin's timer.
async fn fire_bin(shared: Arc<Shared>, generation: u64, key: i64, target: Instant) {
    let wake = target.checked_sub(shared.timing.microspin).unwrap_or(target);
    tokio::time::sleep_until(tokio::time::Instant::from_std(wake)).await;
    precise_wait(target, shared.timing.microspin);

    let payloads = shared.lock().take_bin(generation, key);
    for payload in payloads {
        shared.play(payload);
    }
}

/// The per-run scheduling task.
async fn run_cycles(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    debug!(generation, "[LoopScheduler] Scheduling task started");
    loop {
        let clock = {
            let st = shared.lock();
            if st.generation != generation {
                None
            } else {
                st.transport.running_clock()
            }
        };
        let Some((epoch, len, _)) = clock else {
            break;
        };

        let cycle = cycle_index(epoch, len, Instant::now());
        shared.schedule_cycle(generation, cycle);

        let boundary = cycle_start(epoch, len, cycle + 1);
        let prefetch_at = boundary.checked_sub(shared.timing.prefetch).unwrap_or(boundary);
        if prefetch_at > Instant::now() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(prefetch_at)) => {}
            }
        }

        shared.schedule_cycle(generation, cycle + 1);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(boundary)) => {}
        }
    }
    debug!(generation, "[LoopScheduler] Scheduling task stopped");
}

// ============================================================================
// LoopScheduler
// ============================================================================

/// Transport, loop library and metronome behind one cloneable handle.
#[derive(Clone)]
pub struct LoopScheduler {
    shared: Arc<Shared>,
}

impl LoopScheduler {
    /// `metronome` is the click asset; without one no ticks are scheduled.
    pub fn new(config: &LooperConfig, sink: Arc<dyn SoundSink>, metronome: Option<Arc<SoundAsset>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    transport: Transport::default(),
                    library: LoopLibrary::default(),
                    metronome_enabled: config.metronome_enabled,
                    generation: 0,
                    runtime: None,
                    run: None,
                    scheduled_cycles: BTreeSet::new(),
                    bins: HashMap::new(),
                    by_loop: HashMap::new(),
                }),
                sink,
                metronome,
                timing: Timing::from_config(config),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.shared.lock()
    }

    fn restart(&self, st: &mut SchedulerState, runtime: Handle) {
        st.stop_run();
        st.transport.epoch = Some(Instant::now());
        st.transport.playing = true;
        st.generation += 1;

        let token = CancellationToken::new();
        st.run = Some(token.clone());
        st.runtime = Some(runtime.clone());
        runtime.spawn(run_cycles(Arc::clone(&self.shared), st.generation, token));
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    /// Configure and start the transport from cycle 0.
    ///
    /// Invalid settings leave the previous transport untouched.
    pub fn start(&self, bars: u32, bpm: u32, beats_per_bar: u32) -> Result<TransportState, LoopError> {
        let settings = TransportSettings::new(bars, bpm, beats_per_bar)?;
        let runtime = Handle::try_current().map_err(|_| LoopError::NoRuntime)?;

        let mut st = self.lock();
        st.transport.settings = Some(settings);
        self.restart(&mut st, runtime);
        info!(
            "[LoopScheduler] Transport started: {} bars @ {} bpm, {}/bar ({:.3}s cycle)",
            bars,
            bpm,
            beats_per_bar,
            settings.cycle_secs()
        );
        Ok(st.transport.state(Instant::now()))
    }

    /// Resume from cycle 0 with a fresh epoch, or stop and cancel everything.
    pub fn toggle(&self, playing: bool) -> Result<TransportState, LoopError> {
        let mut st = self.lock();
        if playing {
            if st.transport.settings.is_none() {
                return Err(LoopError::NotConfigured);
            }
            let runtime = Handle::try_current().map_err(|_| LoopError::NoRuntime)?;
            self.restart(&mut st, runtime);
            info!("[LoopScheduler] Transport resumed");
        } else {
            st.transport.playing = false;
            st.stop_run();
            info!("[LoopScheduler] Transport stopped");
        }
        Ok(st.transport.state(Instant::now()))
    }

    pub fn transport_state(&self) -> TransportState {
        self.lock().transport.state(Instant::now())
    }

    /// Stop playback without touching settings or loops.
    pub fn shutdown(&self) {
        let mut st = self.lock();
        st.transport.playing = false;
        st.stop_run();
    }

    /// Timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.lock().bins.len()
    }

    // ------------------------------------------------------------------------
    // Metronome
    // ------------------------------------------------------------------------

    /// Takes effect from the next scheduled cycle.
    pub fn toggle_metronome(&self, enabled: bool) -> MetronomeState {
        self.lock().metronome_enabled = enabled;
        self.metronome_state()
    }

    pub fn metronome_state(&self) -> MetronomeState {
        MetronomeState {
            enabled: self.lock().metronome_enabled,
            sound_loaded: self.shared.metronome.is_some(),
        }
    }

    // ------------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------------

    pub fn create_loop(&self, name: Option<&str>) -> LoopInfo {
        let mut st = self.lock();
        let lp = st.library.create(name);
        info!("[LoopScheduler] Created loop '{}' ({})", lp.name, lp.id);
        lp.info()
    }

    pub fn list_loops(&self) -> Vec<LoopInfo> {
        self.lock().library.list().iter().map(|l| l.info()).collect()
    }

    pub fn get_loop(&self, id: Uuid) -> Option<LoopInfo> {
        self.lock().library.get(id).map(|l| l.info())
    }

    pub fn select_loop(&self, id: Uuid) -> Result<LoopInfo, LoopError> {
        self.lock().library.select(id).map(|l| l.info())
    }

    pub fn deselect_loop(&self) {
        self.lock().library.deselect();
    }

    pub fn current_loop(&self) -> Option<LoopInfo> {
        self.lock().library.current().map(|l| l.info())
    }

    /// Deactivating cancels the loop's pending timers; reactivating
    /// schedules its events into cycles already prepared.
    pub fn toggle_loop(&self, id: Uuid, active: bool) -> Result<LoopInfo, LoopError> {
        let mut st = self.lock();
        let was_active = st.library.get(id).ok_or(LoopError::LoopNotFound(id))?.active;
        let events = st.library.set_active(id, active)?.events.clone();
        if !active {
            st.cancel_loop(id);
        } else if !was_active {
            self.shared.schedule_late(&mut st, id, &events);
        }
        st.library.get(id).map(|l| l.info()).ok_or(LoopError::LoopNotFound(id))
    }

    pub fn clear_loop(&self, id: Uuid) -> Result<LoopInfo, LoopError> {
        let mut st = self.lock();
        let info = st.library.clear(id)?.info();
        st.cancel_loop(id);
        Ok(info)
    }

    pub fn delete_loop(&self, id: Uuid) -> bool {
        let mut st = self.lock();
        let removed = st.library.delete(id);
        if removed {
            st.cancel_loop(id);
            info!("[LoopScheduler] Deleted loop {}", id);
        }
        removed
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    pub fn record(&self, asset: Arc<SoundAsset>, gain: f32, label: Option<String>) -> Result<LoopInfo, LoopError> {
        self.record_at(asset, gain, label, Instant::now())
    }

    /// Record a trigger that happened at `at` into the selected loop.
    ///
    /// Requires a selected loop and a playing transport. If the event's slot
    /// in an already prepared cycle is still ahead, it is scheduled there too.
    pub fn record_at(
        &self,
        asset: Arc<SoundAsset>,
        gain: f32,
        label: Option<String>,
        at: Instant,
    ) -> Result<LoopInfo, LoopError> {
        let mut st = self.lock();
        let loop_id = st.library.selected_id().ok_or(LoopError::NoLoopSelected)?;
        let Some((epoch, len, _)) = st.transport.running_clock() else {
            return Err(if st.transport.settings.is_none() {
                LoopError::NotConfigured
            } else {
                LoopError::NotPlaying
            });
        };

        let event = LoopEvent {
            id: Uuid::new_v4(),
            offset_secs: record_offset(epoch, len, at),
            asset,
            gain,
            label,
        };
        let lp = st.library.record(event.clone())?;
        let active = lp.active;
        let info = lp.info();
        debug!(loop_id = %loop_id, offset = event.offset_secs, "Loop event recorded");

        if active {
            self.shared.schedule_late(&mut st, loop_id, std::slice::from_ref(&event));
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VoiceHandle;

    #[derive(Default)]
    struct RecordingSink {
        plays: Mutex<Vec<(String, f32, Instant)>>,
    }

    impl RecordingSink {
        fn plays(&self) -> Vec<(String, f32, Instant)> {
            self.plays.lock().unwrap().clone()
        }
    }

    impl SoundSink for RecordingSink {
        fn play(&self, asset: Arc<SoundAsset>, gain: f32) -> VoiceHandle {
            let mut plays = self.plays.lock().unwrap();
            plays.push((asset.path().to_string(), gain, Instant::now()));
            VoiceHandle::new(plays.len() as u64)
        }

        fn stop(&self, _handle: VoiceHandle) -> bool {
            false
        }
    }

    fn asset(path: &str) -> Arc<SoundAsset> {
        Arc::new(SoundAsset::from_interleaved(path, 48_000, 1, &[0.1; 8]))
    }

    fn scheduler(metronome: bool) -> (LoopScheduler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let config = LooperConfig {
            metronome_enabled: metronome,
            ..LooperConfig::default()
        };
        let click = Some(Arc::new(SoundAsset::click(48_000, 1_600.0, 0.01)));
        (LoopScheduler::new(&config, sink.clone(), click), sink)
    }

    fn paths(plays: &[(String, f32, Instant)], path: &str) -> Vec<Instant> {
        plays.iter().filter(|p| p.0 == path).map(|p| p.2).collect()
    }

    #[test]
    fn test_start_without_runtime() {
        let (sched, _) = scheduler(false);
        assert_eq!(sched.start(4, 120, 4).err(), Some(LoopError::NoRuntime));
        assert_eq!(sched.transport_state().bars, None);
        assert_eq!(sched.start(4, 10, 4).err(), Some(LoopError::InvalidBpm(10)));
    }

    #[tokio::test]
    async fn test_invalid_start_keeps_previous_transport() {
        let (sched, _) = scheduler(false);
        let state = sched.start(4, 120, 4).unwrap();
        assert_eq!(state.cycle_secs, Some(8.0));
        assert!(state.playing);

        assert_eq!(sched.start(0, 120, 4).err(), Some(LoopError::InvalidBars(0)));
        let state = sched.transport_state();
        assert_eq!(state.bars, Some(4));
        assert!(state.playing);
        sched.shutdown();
    }

    #[tokio::test]
    async fn test_toggle_requires_configuration() {
        let (sched, _) = scheduler(false);
        assert_eq!(sched.toggle(true).err(), Some(LoopError::NotConfigured));
        assert!(!sched.toggle(false).unwrap().playing);
    }

    #[tokio::test]
    async fn test_record_preconditions() {
        let (sched, _) = scheduler(false);
        assert_eq!(sched.record(asset("a"), 1.0, None).err(), Some(LoopError::NoLoopSelected));

        let id = sched.create_loop(None).id;
        sched.select_loop(id).unwrap();
        assert_eq!(sched.record(asset("a"), 1.0, None).err(), Some(LoopError::NotConfigured));

        sched.start(1, 120, 4).unwrap();
        sched.toggle(false).unwrap();
        assert_eq!(sched.record(asset("a"), 1.0, None).err(), Some(LoopError::NotPlaying));

        sched.toggle(true).unwrap();
        let info = sched.record(asset("a"), 0.8, Some("hit".into())).unwrap();
        assert_eq!(info.events.len(), 1);
        assert!(info.events[0].offset_secs < 2.0);
        assert_eq!(info.events[0].label.as_deref(), Some("hit"));
        sched.shutdown();
    }

    #[tokio::test]
    async fn test_recorded_event_replays_each_cycle() {
        let (sched, sink) = scheduler(false);
        let id = sched.create_loop(Some("beat")).id;
        sched.select_loop(id).unwrap();

        // 1 bar of 1 beat at 300 bpm: 0.2 s cycle.
        sched.start(1, 300, 1).unwrap();
        sched.record_at(asset("kick"), 1.0, None, Instant::now() + Duration::from_millis(50)).unwrap();

        tokio::time::sleep(Duration::from_millis(560)).await;
        sched.shutdown();

        let fires = paths(&sink.plays(), "kick");
        assert!(fires.len() >= 3, "fired {} times", fires.len());
        for pair in fires.windows(2) {
            let gap = pair[1].duration_since(pair[0]).as_secs_f64();
            assert!((gap - 0.2).abs() < 0.03, "gap {gap}");
        }
        // Metronome disabled: no audible clicks.
        assert!(sink.plays().iter().all(|p| p.0 == "kick"));
    }

    #[tokio::test]
    async fn test_metronome_strong_and_weak_beats() {
        let (sched, sink) = scheduler(true);
        // 1 bar of 2 beats at 300 bpm: ticks at 0.0 and 0.2 s.
        sched.start(1, 300, 2).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        sched.shutdown();

        let gains: Vec<f32> = sink.plays().iter().map(|p| p.1).collect();
        assert_eq!(gains, vec![0.7, 0.5]);
    }

    #[tokio::test]
    async fn test_stop_cancels_every_timer() {
        let (sched, sink) = scheduler(true);
        let id = sched.create_loop(None).id;
        sched.select_loop(id).unwrap();
        sched.start(1, 60, 4).unwrap();
        sched.record_at(asset("kick"), 1.0, None, Instant::now() + Duration::from_millis(500)).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sched.pending_timers() > 0);

        sched.toggle(false).unwrap();
        assert_eq!(sched.pending_timers(), 0);
        let before = sink.plays().len();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sink.plays().len(), before);
        assert_eq!(sched.get_loop(id).unwrap().events.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_resets_cycle_indexing() {
        let (sched, sink) = scheduler(true);
        sched.start(1, 300, 1).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(sched.transport_state().cycle_index, Some(1));

        sched.toggle(false).unwrap();
        let stopped_at = Instant::now();
        sched.toggle(true).unwrap();
        assert_eq!(sched.transport_state().cycle_index, Some(0));

        tokio::time::sleep(Duration::from_millis(100)).await;
        sched.shutdown();

        // Exactly one click after restart (the new cycle 0 downbeat).
        let after: Vec<_> = sink.plays().into_iter().filter(|p| p.2 >= stopped_at).collect();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].1, 0.7);
    }

    #[tokio::test]
    async fn test_deactivating_cancels_only_that_loop() {
        let (sched, sink) = scheduler(false);
        let a = sched.create_loop(Some("a")).id;
        let b = sched.create_loop(Some("b")).id;
        sched.start(1, 60, 4).unwrap();

        let at = Instant::now() + Duration::from_millis(150);
        sched.select_loop(a).unwrap();
        sched.record_at(asset("a.wav"), 1.0, None, at).unwrap();
        sched.select_loop(b).unwrap();
        sched.record_at(asset("b.wav"), 1.0, None, at).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        sched.toggle_loop(a, false).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        sched.shutdown();

        let plays = sink.plays();
        assert!(paths(&plays, "a.wav").is_empty());
        assert_eq!(paths(&plays, "b.wav").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear_loop() {
        let (sched, _) = scheduler(false);
        let id = sched.create_loop(None).id;
        sched.select_loop(id).unwrap();
        sched.start(1, 120, 4).unwrap();
        sched.record(asset("a"), 1.0, None).unwrap();

        assert!(sched.clear_loop(id).unwrap().events.is_empty());
        assert!(sched.delete_loop(id));
        assert!(sched.current_loop().is_none());
        assert_eq!(sched.toggle_loop(id, true).err(), Some(LoopError::LoopNotFound(id)));
        sched.shutdown();
    }

    #[test]
    fn test_metronome_state() {
        let (sched, _) = scheduler(true);
        assert!(sched.metronome_state().enabled);
        assert!(sched.metronome_state().sound_loaded);
        assert!(!sched.toggle_metronome(false).enabled);
    }

    #[tokio::test]
    async fn test_near_simultaneous_events_share_one_timer() {
        let sink = Arc::new(RecordingSink::default());
        let sched = LoopScheduler::new(&LooperConfig::default(), sink.clone(), None);
        let id = sched.create_loop(None).id;
        sched.select_loop(id).unwrap();

        // 1 bar of 1 beat at 30 bpm: a 2 s cycle, so only cycle 0 is queued.
        sched.start(1, 30, 1).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let idle = sched.pending_timers();

        let first_at = Instant::now() + Duration::from_millis(100);
        let info = sched.record_at(asset("tom"), 1.0, None, first_at).unwrap();
        let first = info.events[0].offset_secs;

        // 0.3 ms apart, on whichever side keeps both in the first event's 1 ms bin.
        let bin_center = (first * 1000.0).round() / 1000.0;
        let gap = Duration::from_micros(300);
        let second_at = if first - bin_center <= 0.0002 { first_at + gap } else { first_at - gap };
        let info = sched.record_at(asset("tom"), 0.5, None, second_at).unwrap();

        assert_eq!(info.events.len(), 2);
        assert_eq!(sched.pending_timers(), idle + 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let plays = sink.plays();
        sched.shutdown();

        let gains: Vec<f32> = plays.iter().filter(|p| p.0 == "tom").map(|p| p.1).collect();
        assert_eq!(gains, vec![1.0, 0.5]);
        assert_eq!(sched.pending_timers(), 0);
    }
}
