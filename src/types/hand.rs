//! Hand and sensor identity types

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of pressure channels tracked per glove.
///
/// The datagram carries six readings; the seventh channel (pinky MCP / palm
/// edge) is zero-padded so sensor indices line up with hand landmarks.
pub const SENSORS_PER_HAND: usize = 7;

/// Which glove a reading or landmark set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    /// Both hands, in a fixed order.
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }

    /// Dense index (left = 0, right = 1) for per-hand arrays.
    pub fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }
}

impl std::fmt::Display for Hand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a hand label fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hand must be 'left' or 'right', got '{0}'")]
pub struct ParseHandError(pub String);

impl FromStr for Hand {
    type Err = ParseHandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Hand::Left),
            "right" => Ok(Hand::Right),
            other => Err(ParseHandError(other.to_string())),
        }
    }
}

/// Identity of one pressure sensor: (hand, channel index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorKey {
    pub hand: Hand,
    pub sensor: u8,
}

impl SensorKey {
    /// Build a key, rejecting channel indices outside `[0, SENSORS_PER_HAND)`.
    pub fn new(hand: Hand, sensor: usize) -> Option<Self> {
        if sensor < SENSORS_PER_HAND {
            u8::try_from(sensor).ok().map(|sensor| Self { hand, sensor })
        } else {
            None
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.sensor)
    }
}

impl std::fmt::Display for SensorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hand, self.sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_parse_is_case_insensitive() {
        assert_eq!("Left".parse::<Hand>(), Ok(Hand::Left));
        assert_eq!(" RIGHT ".parse::<Hand>(), Ok(Hand::Right));
        assert!("middle".parse::<Hand>().is_err());
    }

    #[test]
    fn test_sensor_key_range() {
        assert!(SensorKey::new(Hand::Left, 0).is_some());
        assert!(SensorKey::new(Hand::Left, SENSORS_PER_HAND - 1).is_some());
        assert!(SensorKey::new(Hand::Left, SENSORS_PER_HAND).is_none());
    }

    #[test]
    fn test_hand_serde_lowercase() {
        let json = serde_json::to_string(&Hand::Right).unwrap();
        assert_eq!(json, "\"right\"");
        let key: SensorKey = serde_json::from_str(r#"{"hand":"left","sensor":3}"#).unwrap();
        assert_eq!(key.to_string(), "left:3");
    }
}
