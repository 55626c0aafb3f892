//! Transport settings and cycle arithmetic
//!
//! All timing is relative to a monotonic epoch captured when the transport
//! starts. Cycle `n` begins at `epoch + n * cycle_len`.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::LoopError;
use crate::config::defaults::{MAX_BEATS_PER_BAR, MAX_BPM, MIN_BEATS_PER_BAR, MIN_BPM};

/// Validated tempo settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransportSettings {
    pub bars: u32,
    pub bpm: u32,
    pub beats_per_bar: u32,
}

impl TransportSettings {
    pub fn new(bars: u32, bpm: u32, beats_per_bar: u32) -> Result<Self, LoopError> {
        if bars < 1 {
            return Err(LoopError::InvalidBars(bars));
        }
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(LoopError::InvalidBpm(bpm));
        }
        if !(MIN_BEATS_PER_BAR..=MAX_BEATS_PER_BAR).contains(&beats_per_bar) {
            return Err(LoopError::InvalidBeatsPerBar(beats_per_bar));
        }
        Ok(Self {
            bars,
            bpm,
            beats_per_bar,
        })
    }

    pub fn beat_secs(&self) -> f64 {
        60.0 / f64::from(self.bpm)
    }

    pub fn total_beats(&self) -> u32 {
        self.bars * self.beats_per_bar
    }

    /// bars × beats_per_bar × 60 / bpm
    pub fn cycle_secs(&self) -> f64 {
        f64::from(self.total_beats()) * self.beat_secs()
    }
}

/// Index of the cycle containing `now`. Times before the epoch are cycle 0.
pub fn cycle_index(epoch: Instant, cycle_secs: f64, now: Instant) -> u64 {
    let elapsed = now.saturating_duration_since(epoch).as_secs_f64();
    (elapsed / cycle_secs).floor() as u64
}

/// Start of cycle `cycle`.
pub fn cycle_start(epoch: Instant, cycle_secs: f64, cycle: u64) -> Instant {
    epoch + Duration::from_secs_f64(cycle as f64 * cycle_secs)
}

/// When an event recorded at `offset_secs` fires during cycle `cycle`.
pub fn fire_time(epoch: Instant, cycle_secs: f64, cycle: u64, offset_secs: f64) -> Instant {
    cycle_start(epoch, cycle_secs, cycle) + Duration::from_secs_f64(offset_secs.max(0.0))
}

/// Cycle offset of a recording made at `at`, in `[0, cycle_secs)`.
pub fn record_offset(epoch: Instant, cycle_secs: f64, at: Instant) -> f64 {
    let elapsed = at.saturating_duration_since(epoch).as_secs_f64();
    let offset = elapsed.rem_euclid(cycle_secs);
    // rem_euclid can round up to exactly cycle_secs for tiny negative residues.
    if offset >= cycle_secs {
        0.0
    } else {
        offset
    }
}

/// The global timeline.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    pub settings: Option<TransportSettings>,
    pub epoch: Option<Instant>,
    pub playing: bool,
}

impl Transport {
    /// Epoch and cycle length while playing.
    pub fn running_clock(&self) -> Option<(Instant, f64, TransportSettings)> {
        if !self.playing {
            return None;
        }
        let settings = self.settings?;
        let epoch = self.epoch?;
        Some((epoch, settings.cycle_secs(), settings))
    }

    pub fn state(&self, now: Instant) -> TransportState {
        let clock = self.running_clock();
        TransportState {
            playing: self.playing,
            bars: self.settings.map(|s| s.bars),
            bpm: self.settings.map(|s| s.bpm),
            beats_per_bar: self.settings.map(|s| s.beats_per_bar),
            cycle_secs: self.settings.map(|s| s.cycle_secs()),
            cycle_index: clock.map(|(epoch, len, _)| cycle_index(epoch, len, now)),
            position_secs: clock.map(|(epoch, len, _)| record_offset(epoch, len, now)),
        }
    }
}

/// Serializable transport snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportState {
    pub playing: bool,
    pub bars: Option<u32>,
    pub bpm: Option<u32>,
    pub beats_per_bar: Option<u32>,
    pub cycle_secs: Option<f64>,
    pub cycle_index: Option<u64>,
    pub position_secs: Option<f64>,
}
