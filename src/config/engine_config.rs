//! Engine Configuration - every tuning constant as an operator-tunable TOML value
//!
//! Each struct implements `Default` with the values the engine was tuned
//! against, so running without a config file is always valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TOUCHLOOP_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "touchloop.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one engine instance.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$TOUCHLOOP_CONFIG` env var
/// 2. `./touchloop.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Glove datagram reception
    #[serde(default)]
    pub network: NetworkConfig,

    /// Pressure conditioning and trigger detection
    #[serde(default)]
    pub touch: TouchConfig,

    /// Sticky object binding
    #[serde(default)]
    pub binder: BinderConfig,

    /// Tracked-object update gating
    #[serde(default)]
    pub objects: ObjectsConfig,

    /// Mixer and output device
    #[serde(default)]
    pub audio: AudioConfig,

    /// Loop transport and timer scheduling
    #[serde(default)]
    pub looper: LooperConfig,

    /// Queue capacities between threads and tasks
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$TOUCHLOOP_CONFIG` environment variable
    /// 2. `./touchloop.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./touchloop.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Touch off-threshold must be strictly below the on-threshold
    /// - Smoothing factors must lie in (0, 1]
    /// - Gate ratios must bracket 1.0 (min visibility < 1 < max growth)
    /// - Decay factors must lie in (0, 1)
    /// - Block size and voice count must be > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let t = &self.touch;
        if t.off_threshold >= t.on_threshold {
            errors.push(format!(
                "touch.off_threshold ({:.3}) must be < on_threshold ({:.3})",
                t.off_threshold, t.on_threshold
            ));
        }
        Self::check_unit_interval(t.smoothing_alpha, "touch.smoothing_alpha", &mut errors);
        if t.velocity_curve <= 0.0 {
            errors.push("touch.velocity_curve must be > 0".to_string());
        }
        if t.max_raw == 0 {
            errors.push("touch.max_raw must be > 0".to_string());
        }

        let o = &self.objects;
        if o.min_visibility_ratio <= 0.0 || o.min_visibility_ratio > 1.0 {
            errors.push(format!(
                "objects.min_visibility_ratio ({:.3}) must be in (0, 1]",
                o.min_visibility_ratio
            ));
        }
        if o.max_growth_ratio < 1.0 {
            errors.push(format!(
                "objects.max_growth_ratio ({:.3}) must be >= 1",
                o.max_growth_ratio
            ));
        }
        if o.occluded_tolerance == 0 {
            errors.push("objects.occluded_tolerance must be > 0".to_string());
        }
        Self::check_unit_interval(o.baseline_smoothing, "objects.baseline_smoothing", &mut errors);
        Self::check_decay(o.shrink_decay, "objects.shrink_decay", &mut errors);
        Self::check_decay(o.empty_decay, "objects.empty_decay", &mut errors);

        let a = &self.audio;
        if a.block_size == 0 {
            errors.push("audio.block_size must be > 0".to_string());
        }
        if a.max_voices == 0 {
            errors.push("audio.max_voices must be > 0".to_string());
        }

        let b = &self.bridge;
        if b.glove_capacity == 0 || b.detection_capacity == 0 || b.landmark_capacity == 0 {
            errors.push("bridge capacities must be > 0".to_string());
        }
        if b.event_broadcast_capacity == 0 {
            errors.push("bridge.event_broadcast_capacity must be > 0".to_string());
        }

        // Physical range validation
        let (range_errors, range_warnings) = super::validation::validate_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        // Reject NaN/Inf in any float value
        let floats = [
            t.smoothing_alpha,
            t.on_threshold,
            t.off_threshold,
            t.debounce_ms,
            t.retrigger_ms,
            t.velocity_curve,
            t.aftertouch_step,
            self.binder.dwell_ms,
            o.min_visibility_ratio,
            o.max_growth_ratio,
            o.baseline_smoothing,
            o.shrink_decay,
            o.empty_decay,
            self.looper.prefetch_ms,
            self.looper.coalesce_ms,
            self.looper.microspin_ms,
            f64::from(self.looper.metronome_strong_volume),
            f64::from(self.looper.metronome_weak_volume),
        ];
        if floats.iter().any(|v| !v.is_finite()) {
            errors.push("Config contains NaN or Inf values, all numbers must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_unit_interval(value: f64, name: &str, errors: &mut Vec<String>) {
        if !(value > 0.0 && value <= 1.0) {
            errors.push(format!("{name} ({value}) must be in (0, 1]"));
        }
    }

    fn check_decay(value: f64, name: &str, errors: &mut Vec<String>) {
        if !(value > 0.0 && value < 1.0) {
            errors.push(format!("{name} ({value}) must be in (0, 1)"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Network
// ============================================================================

/// Glove datagram reception settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Local address the glove sockets bind to.
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,

    /// UDP port of the left glove.
    #[serde(default = "default_left_port")]
    pub left_port: u16,

    /// UDP port of the right glove.
    #[serde(default = "default_right_port")]
    pub right_port: u16,

    /// Requested socket receive buffer (the OS may clamp it).
    #[serde(default = "default_recv_buffer_bytes")]
    pub recv_buffer_bytes: usize,

    /// Blocking read timeout so workers notice shutdown promptly.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Start with glove reception enabled.
    #[serde(default = "default_true")]
    pub glove_enabled: bool,
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_left_port() -> u16 { 5005 }
fn default_right_port() -> u16 { 5006 }
fn default_recv_buffer_bytes() -> usize { 1 << 20 }
fn default_read_timeout_ms() -> u64 { 100 }
fn default_true() -> bool { true }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_ip: default_bind_ip(),
            left_port: default_left_port(),
            right_port: default_right_port(),
            recv_buffer_bytes: default_recv_buffer_bytes(),
            read_timeout_ms: default_read_timeout_ms(),
            glove_enabled: default_true(),
        }
    }
}

impl NetworkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

// ============================================================================
// Touch
// ============================================================================

/// Pressure conditioning and hysteresis trigger settings.
///
/// Thresholds are on the normalized [0, 1] pressure scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchConfig {
    /// Full-scale raw reading used for normalization.
    #[serde(default = "default_max_raw")]
    pub max_raw: u16,

    /// EMA weight of the newest sample.
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,

    /// Smoothed pressure at or above which a sensor is pressed.
    #[serde(default = "default_on_threshold")]
    pub on_threshold: f64,

    /// Smoothed pressure at or below which a pressed sensor releases.
    #[serde(default = "default_off_threshold")]
    pub off_threshold: f64,

    /// Minimum time between two accepted state flips.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: f64,

    /// Minimum time between two emitted on-events of one sensor.
    #[serde(default = "default_retrigger_ms")]
    pub retrigger_ms: f64,

    /// Exponent applied to the normalized velocity.
    #[serde(default = "default_velocity_curve")]
    pub velocity_curve: f64,

    /// Emit aftertouch events while held.
    #[serde(default)]
    pub emit_aftertouch: bool,

    /// Pressure change needed before another aftertouch event is emitted.
    #[serde(default = "default_aftertouch_step")]
    pub aftertouch_step: f64,
}

fn default_max_raw() -> u16 { crate::config::defaults::GLOVE_ADC_MAX }
fn default_smoothing_alpha() -> f64 { 0.5 }
fn default_on_threshold() -> f64 { 0.30 }
fn default_off_threshold() -> f64 { 0.15 }
fn default_debounce_ms() -> f64 { 10.0 }
fn default_retrigger_ms() -> f64 { 80.0 }
fn default_velocity_curve() -> f64 { 1.0 }
fn default_aftertouch_step() -> f64 { 0.05 }

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            max_raw: default_max_raw(),
            smoothing_alpha: default_smoothing_alpha(),
            on_threshold: default_on_threshold(),
            off_threshold: default_off_threshold(),
            debounce_ms: default_debounce_ms(),
            retrigger_ms: default_retrigger_ms(),
            velocity_curve: default_velocity_curve(),
            emit_aftertouch: false,
            aftertouch_step: default_aftertouch_step(),
        }
    }
}

// ============================================================================
// Binder
// ============================================================================

/// Sticky binding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinderConfig {
    /// Minimum time a binding holds before it may switch.
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: f64,
}

fn default_dwell_ms() -> f64 { 20.0 }

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            dwell_ms: default_dwell_ms(),
        }
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Area-plausibility gate for detector updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsConfig {
    /// Reject updates whose area falls below this share of the baseline.
    #[serde(default = "default_min_visibility_ratio")]
    pub min_visibility_ratio: f64,

    /// Reject updates whose area exceeds this multiple of the baseline.
    #[serde(default = "default_max_growth_ratio")]
    pub max_growth_ratio: f64,

    /// Consecutive rejections before the baseline decays.
    #[serde(default = "default_occluded_tolerance")]
    pub occluded_tolerance: u32,

    /// Low-pass factor applied to the baseline on accepted updates.
    #[serde(default = "default_baseline_smoothing")]
    pub baseline_smoothing: f64,

    /// Baseline multiplier after a streak of shrunken updates.
    #[serde(default = "default_shrink_decay")]
    pub shrink_decay: f64,

    /// Baseline multiplier after a streak of empty segmentations.
    #[serde(default = "default_empty_decay")]
    pub empty_decay: f64,

    /// Create tracked objects for unknown ids found in detector snapshots.
    #[serde(default = "default_true")]
    pub auto_track: bool,
}

fn default_min_visibility_ratio() -> f64 { 0.95 }
fn default_max_growth_ratio() -> f64 { 3.0 }
fn default_occluded_tolerance() -> u32 { 15 }
fn default_baseline_smoothing() -> f64 { 0.1 }
fn default_shrink_decay() -> f64 { 0.97 }
fn default_empty_decay() -> f64 { 0.9 }

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            min_visibility_ratio: default_min_visibility_ratio(),
            max_growth_ratio: default_max_growth_ratio(),
            occluded_tolerance: default_occluded_tolerance(),
            baseline_smoothing: default_baseline_smoothing(),
            shrink_decay: default_shrink_decay(),
            empty_decay: default_empty_decay(),
            auto_track: default_true(),
        }
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Mixer and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Engine sample rate; assets must already be at this rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frames rendered per callback.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Polyphony limit; the oldest voice is stolen beyond it.
    #[serde(default = "default_max_voices")]
    pub max_voices: usize,

    /// Use the system output device (requires the `audio-device` feature).
    #[serde(default)]
    pub use_device: bool,
}

fn default_sample_rate() -> u32 { 48_000 }
fn default_block_size() -> usize { 256 }
fn default_max_voices() -> usize { 64 }

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            max_voices: default_max_voices(),
            use_device: false,
        }
    }
}

// ============================================================================
// Looper
// ============================================================================

/// Loop transport scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LooperConfig {
    /// How far ahead of each cycle boundary the next cycle is scheduled.
    #[serde(default = "default_prefetch_ms")]
    pub prefetch_ms: f64,

    /// Events closer together than this share one timer.
    #[serde(default = "default_coalesce_ms")]
    pub coalesce_ms: f64,

    /// Final busy-wait window before a timer's target.
    #[serde(default = "default_microspin_ms")]
    pub microspin_ms: f64,

    /// Metronome audible at startup.
    #[serde(default = "default_true")]
    pub metronome_enabled: bool,

    /// Click volume on the first beat of each bar.
    #[serde(default = "default_strong_volume")]
    pub metronome_strong_volume: f32,

    /// Click volume on the other beats.
    #[serde(default = "default_weak_volume")]
    pub metronome_weak_volume: f32,

    /// Optional WAV file used as the click instead of the built-in tone.
    #[serde(default)]
    pub metronome_sample: Option<PathBuf>,
}

fn default_prefetch_ms() -> f64 { 50.0 }
fn default_coalesce_ms() -> f64 { 1.0 }
fn default_microspin_ms() -> f64 { 1.0 }
fn default_strong_volume() -> f32 { 0.7 }
fn default_weak_volume() -> f32 { 0.5 }

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            prefetch_ms: default_prefetch_ms(),
            coalesce_ms: default_coalesce_ms(),
            microspin_ms: default_microspin_ms(),
            metronome_enabled: default_true(),
            metronome_strong_volume: default_strong_volume(),
            metronome_weak_volume: default_weak_volume(),
            metronome_sample: None,
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Queue capacities. A capacity of 1 keeps only the freshest item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_capacity")]
    pub glove_capacity: usize,

    #[serde(default = "default_capacity")]
    pub detection_capacity: usize,

    #[serde(default = "default_capacity")]
    pub landmark_capacity: usize,

    /// Buffered touch events per subscriber before lagging ones skip ahead.
    #[serde(default = "default_event_broadcast_capacity")]
    pub event_broadcast_capacity: usize,
}

fn default_capacity() -> usize { 1 }
fn default_event_broadcast_capacity() -> usize { 256 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            glove_capacity: default_capacity(),
            detection_capacity: default_capacity(),
            landmark_capacity: default_capacity(),
            event_broadcast_capacity: default_event_broadcast_capacity(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: EngineConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.network.left_port, 5005);
        assert_eq!(config.binder.dwell_ms, 20.0);
        assert_eq!(config.objects.min_visibility_ratio, 0.95);
        assert_eq!(config.objects.occluded_tolerance, 15);
        assert_eq!(config.audio.block_size, 256);
        assert_eq!(config.looper.prefetch_ms, 50.0);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[touch]
on_threshold = 0.5
off_threshold = 0.2

[audio]
block_size = 128
"#;
        let config = EngineConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.touch.on_threshold, 0.5);
        assert_eq!(config.audio.block_size, 128);
        // Non-overridden values retain defaults
        assert_eq!(config.touch.smoothing_alpha, 0.5);
        assert_eq!(config.audio.sample_rate, 48_000);
    }

    #[test]
    fn test_validation_catches_inverted_thresholds() {
        let mut config = EngineConfig::default();
        config.touch.on_threshold = 0.1;
        config.touch.off_threshold = 0.2;
        let result = config.validate();
        assert!(result.is_err(), "Inverted thresholds should fail validation");
        if let Err(ConfigError::Validation(errors)) = result {
            assert!(errors.iter().any(|e| e.contains("off_threshold")));
        }
    }

    #[test]
    fn test_validation_catches_bad_decay() {
        let mut config = EngineConfig::default();
        config.objects.shrink_decay = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nan() {
        let mut config = EngineConfig::default();
        config.looper.prefetch_ms = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = EngineConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let parsed: EngineConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original.touch.on_threshold, parsed.touch.on_threshold);
        assert_eq!(original.network.right_port, parsed.network.right_port);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("touchloop.toml");
        std::fs::write(&path, "[binder]\ndwell_ms = 35.0\n").unwrap();
        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.binder.dwell_ms, 35.0);
    }

    #[test]
    fn test_load_from_missing_file_is_io_error() {
        let err = EngineConfig::load_from_file(Path::new("/nonexistent/touchloop.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
