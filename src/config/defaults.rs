//! System-wide default constants.
//!
//! Centralises fixed numbers that are not operator-tunable.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Acquisition
// ============================================================================

/// Size of one glove datagram: u32 timestamp + six u16 readings.
pub const GLOVE_PACKET_SIZE: usize = 16;

/// Receive buffer length for one datagram read (oversized on purpose).
pub const GLOVE_RECV_BUFFER: usize = 64;

/// Full-scale value of the glove ADC (12-bit).
pub const GLOVE_ADC_MAX: u16 = 4095;

// ============================================================================
// Audio
// ============================================================================

/// Output channel count; assets are normalised to interleaved stereo.
pub const OUTPUT_CHANNELS: usize = 2;

/// Length of the built-in metronome click (seconds).
pub const METRONOME_CLICK_SECS: f64 = 0.03;

/// Pitch of the built-in metronome click (Hz).
pub const METRONOME_CLICK_HZ: f64 = 1_600.0;

// ============================================================================
// Transport limits
// ============================================================================

/// Inclusive BPM range accepted by `transport start`.
pub const MIN_BPM: u32 = 30;
pub const MAX_BPM: u32 = 300;

/// Inclusive beats-per-bar range accepted by `transport start`.
pub const MIN_BEATS_PER_BAR: u32 = 1;
pub const MAX_BEATS_PER_BAR: u32 = 16;

/// Beats per bar when a start command omits it.
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Name given to loops created without one.
pub const DEFAULT_LOOP_NAME: &str = "Untitled Loop";

// ============================================================================
// Mapping
// ============================================================================

/// Inclusive volume range for a sound mapping.
pub const MIN_MAPPING_VOLUME: f32 = 0.0;
pub const MAX_MAPPING_VOLUME: f32 = 2.0;

/// Path sentinel that unsets a mapping in a bulk update.
pub const UNSET_PATH_SENTINEL: &str = "null";

// ============================================================================
// Simulation
// ============================================================================

/// Default datagram rate of the glove simulator (packets per second per hand).
pub const SIMULATION_PACKET_RATE_HZ: u64 = 500;
