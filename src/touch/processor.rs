//! Pressure conditioning and hysteresis trigger detection
//!
//! Per sensor:
//! 1. normalize raw reading to [0, 1] against `max_raw`
//! 2. EMA low-pass, clamped to [0, 1]
//! 3. two-threshold hysteresis (on ≥ on_threshold, off ≤ off_threshold)
//! 4. debounce: a flip within `debounce_ms` of the last accepted flip is ignored
//! 5. retrigger guard: a press within `retrigger_ms` of the last emitted
//!    on-event updates state silently, and so does its release

use std::collections::HashMap;

use crate::config::TouchConfig;
use crate::types::{Hand, SensorFrame, SensorKey, TouchEvent, TouchKind, SENSORS_PER_HAND};

#[derive(Debug, Clone, Default)]
struct SensorState {
    smoothed: f64,
    pressed: bool,
    last_flip: Option<f64>,
    last_on: Option<f64>,
    /// Whether the current press produced an on-event.
    on_emitted: bool,
    press_value: f64,
    last_aftertouch: f64,
    last_ts: Option<f64>,
}

impl SensorState {
    fn forget_history(&mut self) {
        self.last_flip = None;
        self.last_on = None;
    }
}

/// Turns raw per-channel pressures into on/off (and optional aftertouch) events.
pub struct TouchProcessor {
    config: TouchConfig,
    states: HashMap<SensorKey, SensorState>,
}

impl TouchProcessor {
    pub fn new(config: TouchConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    /// Process one deframed datagram.
    pub fn process_frame(&mut self, frame: &SensorFrame) -> Vec<TouchEvent> {
        self.update(frame.hand, &frame.values, frame.timestamp)
    }

    /// Process all channels of one hand at one instant.
    ///
    /// Missing channels are treated as zero pressure; extra channels are
    /// ignored. Emits at most one event per sensor.
    pub fn update(&mut self, hand: Hand, raw: &[u16], timestamp: f64) -> Vec<TouchEvent> {
        let mut events = Vec::new();
        for sensor in 0..SENSORS_PER_HAND {
            let value = raw.get(sensor).copied().unwrap_or(0);
            let Some(key) = SensorKey::new(hand, sensor) else {
                continue;
            };
            if let Some(event) = self.update_sensor(key, value, timestamp) {
                events.push(event);
            }
        }
        events
    }

    fn update_sensor(&mut self, key: SensorKey, raw: u16, ts: f64) -> Option<TouchEvent> {
        let cfg = &self.config;
        let st = self.states.entry(key).or_default();

        // Board reset or 32-bit µs wrap: nothing before this point is comparable.
        if st.last_ts.is_some_and(|prev| ts < prev) {
            st.forget_history();
        }
        st.last_ts = Some(ts);

        let normalized = (f64::from(raw) / f64::from(cfg.max_raw.max(1))).clamp(0.0, 1.0);
        st.smoothed = (cfg.smoothing_alpha * normalized + (1.0 - cfg.smoothing_alpha) * st.smoothed)
            .clamp(0.0, 1.0);

        let want_pressed = if st.pressed {
            st.smoothed > cfg.off_threshold
        } else {
            st.smoothed >= cfg.on_threshold
        };

        if want_pressed != st.pressed {
            let debounce = cfg.debounce_ms / 1000.0;
            if st.last_flip.is_some_and(|last| ts - last < debounce) {
                return None;
            }
            st.pressed = want_pressed;
            st.last_flip = Some(ts);

            if st.pressed {
                st.press_value = st.smoothed;
                st.last_aftertouch = st.smoothed;

                let retrigger = cfg.retrigger_ms / 1000.0;
                if st.last_on.is_some_and(|last| ts - last < retrigger) {
                    st.on_emitted = false;
                    return None;
                }
                st.on_emitted = true;
                st.last_on = Some(ts);
                let velocity = velocity(st.smoothed, cfg);
                return Some(event(TouchKind::On, key, velocity, ts, None));
            }

            if std::mem::take(&mut st.on_emitted) {
                return Some(event(TouchKind::Off, key, 0.0, ts, None));
            }
            return None;
        }

        if st.pressed && st.on_emitted && cfg.emit_aftertouch {
            if (st.smoothed - st.last_aftertouch).abs() >= cfg.aftertouch_step {
                st.last_aftertouch = st.smoothed;
                let delta = (st.smoothed - st.press_value) as f32;
                return Some(event(
                    TouchKind::Aftertouch,
                    key,
                    st.smoothed as f32,
                    ts,
                    Some(delta),
                ));
            }
        }

        None
    }

    /// Whether the sensor is currently considered pressed.
    pub fn is_pressed(&self, key: SensorKey) -> bool {
        self.states.get(&key).is_some_and(|s| s.pressed)
    }

    /// Current smoothed pressure of a sensor (0 if never seen).
    pub fn smoothed(&self, key: SensorKey) -> f64 {
        self.states.get(&key).map_or(0.0, |s| s.smoothed)
    }

    /// Drop all per-sensor state.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}

fn velocity(smoothed: f64, cfg: &TouchConfig) -> f32 {
    let span = (cfg.on_threshold - cfg.off_threshold).max(f64::EPSILON);
    let norm = ((smoothed - cfg.off_threshold) / span).clamp(0.0, 1.0);
    norm.powf(cfg.velocity_curve) as f32
}

fn event(kind: TouchKind, key: SensorKey, velocity: f32, timestamp: f64, pressure_delta: Option<f32>) -> TouchEvent {
    TouchEvent {
        kind,
        hand: key.hand,
        sensor: key.sensor,
        velocity,
        timestamp,
        pressure_delta,
        object_id: None,
    }
}
