//! Glove datagram deframing
//!
//! Wire layout (little-endian, 16 bytes):
//!
//! | offset | type | field                      |
//! |--------|------|----------------------------|
//! | 0      | u32  | board timestamp (µs)       |
//! | 4..16  | u16×6| raw FSR readings           |
//!
//! The FSR divider reads high when idle, so values are inverted against the
//! ADC full scale before use. Trailing bytes beyond 16 are ignored.

use crate::config::defaults::GLOVE_PACKET_SIZE;
use crate::types::{Hand, SensorFrame, RAW_CHANNELS_PER_FRAME};

/// Parse one datagram. Returns `None` when it is shorter than a full frame.
pub fn parse_datagram(hand: Hand, data: &[u8], adc_max: u16) -> Option<SensorFrame> {
    if data.len() < GLOVE_PACKET_SIZE {
        return None;
    }

    let ts_us = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

    let mut values = [0u16; RAW_CHANNELS_PER_FRAME];
    for (i, chunk) in data[4..GLOVE_PACKET_SIZE].chunks_exact(2).enumerate() {
        let raw = u16::from_le_bytes([chunk[0], chunk[1]]);
        values[i] = adc_max.saturating_sub(raw);
    }

    Some(SensorFrame {
        hand,
        timestamp: f64::from(ts_us) / 1_000_000.0,
        values,
    })
}

/// Build a datagram from already-inverted pressures. Used by the simulator.
pub fn encode_datagram(ts_us: u32, pressures: &[u16; RAW_CHANNELS_PER_FRAME], adc_max: u16) -> [u8; GLOVE_PACKET_SIZE] {
    let mut buf = [0u8; GLOVE_PACKET_SIZE];
    buf[..4].copy_from_slice(&ts_us.to_le_bytes());
    for (i, p) in pressures.iter().enumerate() {
        let raw = adc_max.saturating_sub(*p);
        buf[4 + i * 2..6 + i * 2].copy_from_slice(&raw.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram(ts: u32, raws: [u16; 6]) -> Vec<u8> {
        let mut v = ts.to_le_bytes().to_vec();
        for r in raws {
            v.extend_from_slice(&r.to_le_bytes());
        }
        v
    }

    #[test]
    fn test_parse_inverts_against_full_scale() {
        let data = datagram(2_500_000, [4095, 0, 1000, 4095, 4095, 4000]);
        let frame = parse_datagram(Hand::Left, &data, 4095).unwrap();
        assert_eq!(frame.hand, Hand::Left);
        assert_eq!(frame.timestamp, 2.5);
        assert_eq!(frame.values, [0, 4095, 3095, 0, 0, 95]);
    }

    #[test]
    fn test_short_datagram_is_dropped() {
        let data = datagram(1, [0; 6]);
        assert!(parse_datagram(Hand::Right, &data[..15], 4095).is_none());
        assert!(parse_datagram(Hand::Right, &[], 4095).is_none());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut data = datagram(10, [4095; 6]);
        data.extend_from_slice(&[0xAA; 8]);
        let frame = parse_datagram(Hand::Right, &data, 4095).unwrap();
        assert_eq!(frame.values, [0; 6]);
    }

    #[test]
    fn test_out_of_range_raw_saturates_to_zero() {
        let data = datagram(0, [u16::MAX; 6]);
        let frame = parse_datagram(Hand::Left, &data, 4095).unwrap();
        assert_eq!(frame.values, [0; 6]);
    }

    #[test]
    fn test_encode_matches_parser() {
        let bytes = encode_datagram(123_456, &[0, 1, 2, 3, 4, 4095], 4095);
        let frame = parse_datagram(Hand::Left, &bytes, 4095).unwrap();
        assert_eq!(frame.values, [0, 1, 2, 3, 4, 4095]);
        assert!((frame.timestamp - 0.123456).abs() < 1e-9);
    }
}
