//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::defaults::{MAX_MAPPING_VOLUME, MIN_MAPPING_VOLUME};

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for EngineConfig.
///
/// Maintained by hand to match the struct hierarchy in engine_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [network]
        "network",
        "network.bind_ip",
        "network.left_port",
        "network.right_port",
        "network.recv_buffer_bytes",
        "network.read_timeout_ms",
        "network.glove_enabled",
        // [touch]
        "touch",
        "touch.max_raw",
        "touch.smoothing_alpha",
        "touch.on_threshold",
        "touch.off_threshold",
        "touch.debounce_ms",
        "touch.retrigger_ms",
        "touch.velocity_curve",
        "touch.emit_aftertouch",
        "touch.aftertouch_step",
        // [binder]
        "binder",
        "binder.dwell_ms",
        // [objects]
        "objects",
        "objects.min_visibility_ratio",
        "objects.max_growth_ratio",
        "objects.occluded_tolerance",
        "objects.baseline_smoothing",
        "objects.shrink_decay",
        "objects.empty_decay",
        "objects.auto_track",
        // [audio]
        "audio",
        "audio.sample_rate",
        "audio.block_size",
        "audio.max_voices",
        "audio.use_device",
        // [looper]
        "looper",
        "looper.prefetch_ms",
        "looper.coalesce_ms",
        "looper.microspin_ms",
        "looper.metronome_enabled",
        "looper.metronome_strong_volume",
        "looper.metronome_weak_volume",
        "looper.metronome_sample",
        // [bridge]
        "bridge",
        "bridge.glove_capacity",
        "bridge.detection_capacity",
        "bridge.landmark_capacity",
        "bridge.event_broadcast_capacity",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so output is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed EngineConfig.
///
/// Returns (errors, warnings). Errors are values the engine cannot run
/// with; warnings are legal but almost certainly mistuned.
pub fn validate_ranges(config: &super::EngineConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let n = &config.network;
    if n.left_port == 0 || n.right_port == 0 {
        errors.push("network ports must be non-zero".to_string());
    }
    if n.left_port == n.right_port {
        errors.push(format!(
            "network.left_port and network.right_port are both {}",
            n.left_port
        ));
    }
    if n.bind_ip.parse::<std::net::IpAddr>().is_err() {
        errors.push(format!("network.bind_ip = '{}' is not an IP address", n.bind_ip));
    }

    let t = &config.touch;
    for (name, value) in [
        ("touch.debounce_ms", t.debounce_ms),
        ("touch.retrigger_ms", t.retrigger_ms),
        ("binder.dwell_ms", config.binder.dwell_ms),
    ] {
        if value < 0.0 {
            errors.push(format!("{name} = {value} cannot be negative"));
        }
    }
    if t.on_threshold > 1.0 || t.off_threshold < 0.0 {
        errors.push(format!(
            "touch thresholds ({:.3}/{:.3}) must lie in [0, 1]",
            t.off_threshold, t.on_threshold
        ));
    }
    if t.emit_aftertouch && t.aftertouch_step <= 0.0 {
        errors.push("touch.aftertouch_step must be > 0 when aftertouch is enabled".to_string());
    }

    let a = &config.audio;
    if !(8_000..=192_000).contains(&a.sample_rate) {
        errors.push(format!(
            "audio.sample_rate = {} is outside supported range (8000-192000 Hz)",
            a.sample_rate
        ));
    }
    if a.block_size > 8192 {
        warnings.push(ValidationWarning {
            field: "audio.block_size".to_string(),
            message: format!(
                "audio.block_size = {} adds {:.1} ms of output latency",
                a.block_size,
                a.block_size as f64 * 1000.0 / f64::from(a.sample_rate.max(1))
            ),
            suggestion: None,
        });
    }
    if a.max_voices > 1024 {
        warnings.push(ValidationWarning {
            field: "audio.max_voices".to_string(),
            message: format!("audio.max_voices = {} is unusually high", a.max_voices),
            suggestion: None,
        });
    }

    let l = &config.looper;
    if l.coalesce_ms <= 0.0 {
        errors.push(format!("looper.coalesce_ms = {} must be > 0", l.coalesce_ms));
    }
    if l.microspin_ms < 0.0 {
        errors.push(format!("looper.microspin_ms = {} cannot be negative", l.microspin_ms));
    }
    if l.prefetch_ms <= l.microspin_ms {
        errors.push(format!(
            "looper.prefetch_ms ({}) must exceed looper.microspin_ms ({})",
            l.prefetch_ms, l.microspin_ms
        ));
    }
    for (name, volume) in [
        ("looper.metronome_strong_volume", l.metronome_strong_volume),
        ("looper.metronome_weak_volume", l.metronome_weak_volume),
    ] {
        if !(MIN_MAPPING_VOLUME..=MAX_MAPPING_VOLUME).contains(&volume) {
            errors.push(format!(
                "{name} = {volume} is outside [{MIN_MAPPING_VOLUME}, {MAX_MAPPING_VOLUME}]"
            ));
        }
    }
    if l.prefetch_ms > 500.0 {
        warnings.push(ValidationWarning {
            field: "looper.prefetch_ms".to_string(),
            message: format!(
                "looper.prefetch_ms = {} delays loop edits by up to half a second",
                l.prefetch_ms
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
