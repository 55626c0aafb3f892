//! Glove datagram simulator
//!
//! Sends synthetic pressure datagrams to a running touchloop engine so the
//! touch pipeline can be exercised without hardware. Each hand idles with a
//! little sensor noise and presses a random channel every few hundred
//! milliseconds.
//!
//! # Usage
//! ```bash
//! ./glove-sim --hand both --seconds 30
//! ./glove-sim --hand right --tap-interval-ms 250 --seed 7
//! ```

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use rand::prelude::*;
use tracing::{debug, info};

use touchloop::acquisition::encode_datagram;
use touchloop::config::defaults::{GLOVE_ADC_MAX, SIMULATION_PACKET_RATE_HZ};
use touchloop::config::NetworkConfig;
use touchloop::types::{Hand, RAW_CHANNELS_PER_FRAME};

/// Idle noise ceiling (ADC counts after inversion)
const IDLE_NOISE: u16 = 40;
/// Shortest and longest press (ms)
const PRESS_MS: (u64, u64) = (60, 220);
/// Press peak as a fraction of full scale
const PEAK_FRACTION: (f64, f64) = (0.35, 0.95);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "glove-sim")]
#[command(about = "Synthetic glove pressure datagrams for touchloop testing")]
#[command(version)]
struct Args {
    /// Which glove to simulate: left, right or both
    #[arg(long, default_value = "both")]
    hand: String,

    /// Destination host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Left glove destination port
    #[arg(long)]
    left_port: Option<u16>,

    /// Right glove destination port
    #[arg(long)]
    right_port: Option<u16>,

    /// Datagrams per second per hand
    #[arg(long, default_value_t = SIMULATION_PACKET_RATE_HZ, value_parser = clap::value_parser!(u64).range(1..=2000))]
    rate: u64,

    /// Run time in seconds (0 = until interrupted)
    #[arg(short, long, default_value = "0")]
    seconds: u64,

    /// Mean time between presses per hand
    #[arg(long, default_value = "400")]
    tap_interval_ms: u64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Press model
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Press {
    channel: usize,
    started: Instant,
    length: Duration,
    peak: f64,
}

impl Press {
    /// Triangular envelope: ramp up for the first half, release over the second.
    fn level(&self, now: Instant) -> Option<u16> {
        let elapsed = now.checked_duration_since(self.started)?;
        if elapsed >= self.length {
            return None;
        }
        let phase = elapsed.as_secs_f64() / self.length.as_secs_f64();
        let shape = if phase < 0.5 { phase * 2.0 } else { (1.0 - phase) * 2.0 };
        Some((shape * self.peak * f64::from(GLOVE_ADC_MAX)).round() as u16)
    }
}

struct SimGlove {
    hand: Hand,
    target: SocketAddr,
    press: Option<Press>,
    next_press: Instant,
    sent: u64,
    presses: u64,
}

impl SimGlove {
    fn new(hand: Hand, target: SocketAddr, now: Instant) -> Self {
        Self {
            hand,
            target,
            press: None,
            next_press: now,
            sent: 0,
            presses: 0,
        }
    }

    fn pressures(&mut self, now: Instant, tap_interval: Duration, rng: &mut StdRng) -> [u16; RAW_CHANNELS_PER_FRAME] {
        let mut values = [0u16; RAW_CHANNELS_PER_FRAME];
        for v in values.iter_mut() {
            *v = rng.gen_range(0..=IDLE_NOISE);
        }

        if self.press.is_none() && now >= self.next_press {
            let press = Press {
                channel: rng.gen_range(0..RAW_CHANNELS_PER_FRAME),
                started: now,
                length: Duration::from_millis(rng.gen_range(PRESS_MS.0..=PRESS_MS.1)),
                peak: rng.gen_range(PEAK_FRACTION.0..=PEAK_FRACTION.1),
            };
            debug!("[GloveSim:{}] press channel {} peak {:.2}", self.hand, press.channel, press.peak);
            self.press = Some(press);
            self.presses += 1;
            let jitter = rng.gen_range(0.5..1.5);
            self.next_press = now + press.length + tap_interval.mul_f64(jitter);
        }

        if let Some(press) = self.press {
            match press.level(now) {
                Some(level) => values[press.channel] = values[press.channel].max(level),
                None => self.press = None,
            }
        }

        values
    }
}

fn parse_hands(label: &str) -> Result<Vec<Hand>> {
    if label.trim().eq_ignore_ascii_case("both") {
        return Ok(Hand::ALL.to_vec());
    }
    Ok(vec![label.parse::<Hand>()?])
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let defaults = NetworkConfig::default();
    let hands = parse_hands(&args.hand)?;

    let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind sender socket")?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let start = Instant::now();
    let mut gloves = hands
        .into_iter()
        .map(|hand| {
            let port = match hand {
                Hand::Left => args.left_port.unwrap_or(defaults.left_port),
                Hand::Right => args.right_port.unwrap_or(defaults.right_port),
            };
            let target: SocketAddr = format!("{}:{}", args.host, port)
                .parse()
                .with_context(|| format!("Invalid destination {}:{}", args.host, port))?;
            info!("[GloveSim:{}] Sending to {} at {} Hz", hand, target, args.rate);
            Ok(SimGlove::new(hand, target, start))
        })
        .collect::<Result<Vec<_>>>()?;

    let period = Duration::from_micros(1_000_000 / args.rate);
    let tap_interval = Duration::from_millis(args.tap_interval_ms);
    let deadline = (args.seconds > 0).then(|| start + Duration::from_secs(args.seconds));
    let mut next_tick = start;

    loop {
        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            break;
        }

        // Board clock wraps like the firmware's 32-bit microsecond counter.
        let ts_us = (now.duration_since(start).as_micros() % (u128::from(u32::MAX) + 1)) as u32;
        for glove in gloves.iter_mut() {
            let pressures = glove.pressures(now, tap_interval, &mut rng);
            let datagram = encode_datagram(ts_us, &pressures, GLOVE_ADC_MAX);
            socket
                .send_to(&datagram, glove.target)
                .with_context(|| format!("Failed to send to {}", glove.target))?;
            glove.sent += 1;
        }

        next_tick += period;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        } else {
            next_tick = Instant::now();
        }
    }

    for glove in &gloves {
        info!("[GloveSim:{}] {} datagrams, {} presses", glove.hand, glove.sent, glove.presses);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_envelope_peaks_mid_press() {
        let start = Instant::now();
        let press = Press {
            channel: 0,
            started: start,
            length: Duration::from_millis(100),
            peak: 1.0,
        };
        let mid = press.level(start + Duration::from_millis(50)).unwrap();
        assert_eq!(mid, GLOVE_ADC_MAX);
        let late = press.level(start + Duration::from_millis(90)).unwrap();
        assert!(late < mid / 4);
        assert!(press.level(start + Duration::from_millis(100)).is_none());
    }

    #[test]
    fn test_parse_hands() {
        assert_eq!(parse_hands("both").unwrap(), Hand::ALL.to_vec());
        assert_eq!(parse_hands("Left").unwrap(), vec![Hand::Left]);
        assert!(parse_hands("middle").is_err());
    }
}
