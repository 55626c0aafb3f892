//! Tempo-locked loop engine
//!
//! - [`transport`]: validated tempo settings and cycle arithmetic
//! - [`library`]: named loops and their recorded events
//! - [`scheduler`]: boundary scheduling of loop events and metronome ticks
//! - [`precise_wait`]: bounded sleep-then-spin wait for sub-millisecond firing

pub mod library;
pub mod precise_wait;
pub mod scheduler;
pub mod transport;

use uuid::Uuid;

use crate::config::defaults::{MAX_BEATS_PER_BAR, MAX_BPM, MIN_BEATS_PER_BAR, MIN_BPM};

pub use library::{Loop, LoopEvent, LoopEventInfo, LoopInfo, LoopLibrary};
pub use scheduler::{LoopEventFire, LoopScheduler, MetronomeState, MetronomeTick, ScheduledPayload};
pub use transport::{TransportSettings, TransportState};

/// Loop engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoopError {
    #[error("bars must be >= 1 (got {0})")]
    InvalidBars(u32),

    #[error("bpm must be {MIN_BPM}..{MAX_BPM} (got {0})")]
    InvalidBpm(u32),

    #[error("beats_per_bar must be {MIN_BEATS_PER_BAR}..{MAX_BEATS_PER_BAR} (got {0})")]
    InvalidBeatsPerBar(u32),

    #[error("transport not configured; start it first")]
    NotConfigured,

    #[error("transport is not playing")]
    NotPlaying,

    #[error("no loop selected")]
    NoLoopSelected,

    #[error("loop {0} not found")]
    LoopNotFound(Uuid),

    #[error("loop scheduling requires a running tokio runtime")]
    NoRuntime,
}
