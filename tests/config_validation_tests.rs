//! Config Validation Tests
//!
//! Exercises the TOML loading path end to end: typo detection, range
//! validation and file loading, independently from the rest of the engine.

use std::io::Write;

use touchloop::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use touchloop::config::{ConfigError, EngineConfig};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_touch_threshold_warns_with_suggestion() {
    let toml_str = r#"
[touch]
on_treshold = 0.4
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("on_treshold"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("touch.on_threshold"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[network]
bind_ip = "0.0.0.0"
left_port = 6005
right_port = 6006

[touch]
on_threshold = 0.35
off_threshold = 0.2

[looper]
prefetch_ms = 60.0
metronome_enabled = false
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Unexpected warnings: {:?}", warnings);
}

#[test]
fn unknown_key_still_loads() {
    let config = EngineConfig::from_toml_str(
        r#"
[audio]
sample_rat = 44100
"#,
    )
    .expect("typos only warn");
    assert_eq!(config.audio.sample_rate, EngineConfig::default().audio.sample_rate);
}

#[test]
fn garbage_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert!(suggest_correction("zzzzzzzzzzzz", &known).is_none());
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn inverted_touch_thresholds_rejected() {
    let err = EngineConfig::from_toml_str(
        r#"
[touch]
on_threshold = 0.2
off_threshold = 0.3
"#,
    )
    .unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.contains("off_threshold")), "{:?}", errors);
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn gate_ratios_must_bracket_one() {
    let err = EngineConfig::from_toml_str(
        r#"
[objects]
min_visibility_ratio = 1.5
max_growth_ratio = 0.8
"#,
    )
    .unwrap_err();
    let ConfigError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert!(errors.iter().any(|e| e.contains("min_visibility_ratio")));
    assert!(errors.iter().any(|e| e.contains("max_growth_ratio")));
}

#[test]
fn wrong_type_is_a_parse_error() {
    let err = EngineConfig::from_toml_str(
        r#"
[network]
left_port = "five thousand"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn load_from_file_applies_overrides_and_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[binder]
dwell_ms = 250.0

[looper]
coalesce_ms = 2.0
"#
    )
    .unwrap();

    let config = EngineConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.binder.dwell_ms, 250.0);
    assert_eq!(config.looper.coalesce_ms, 2.0);
    assert_eq!(config.network.left_port, 5005);
    assert_eq!(config.network.right_port, 5006);
}

#[test]
fn missing_file_reports_path() {
    let err = EngineConfig::load_from_file(std::path::Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(ref p, _) if p.ends_with("here.toml")));
}

#[test]
fn default_config_round_trips_through_toml() {
    let config = EngineConfig::default();
    let text = config.to_toml().unwrap();
    assert!(validate_unknown_keys(&text).is_empty());
    let parsed = EngineConfig::from_toml_str(&text).unwrap();
    assert_eq!(parsed.network.left_port, config.network.left_port);
    assert_eq!(parsed.touch.on_threshold, config.touch.on_threshold);
}
