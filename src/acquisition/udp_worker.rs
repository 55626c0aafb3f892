//! Per-hand UDP receive thread
//!
//! Each hand gets its own OS thread and socket. While glove input is
//! disabled the socket is closed and the thread sleeps on the runtime
//! status condvar; when enabled it blocks on `recv_from` with a short read
//! timeout so it notices disable/shutdown promptly.

use super::{glove_packet::parse_datagram, AcquisitionError};
use crate::bridge::BridgeSender;
use crate::config::defaults::GLOVE_RECV_BUFFER;
use crate::config::NetworkConfig;
use crate::status::{Input, RuntimeStatus};
use crate::types::{Hand, SensorFrame};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay before retrying a failed bind.
const REBIND_BACKOFF: Duration = Duration::from_millis(500);

/// Datagram counters for one worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub received: AtomicU64,
    pub malformed: AtomicU64,
}

impl WorkerStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// A running per-hand worker.
pub struct GloveWorker {
    pub hand: Hand,
    pub stats: Arc<WorkerStats>,
    thread: JoinHandle<()>,
}

impl GloveWorker {
    /// Wait for the thread to exit. Call after `RuntimeStatus::shutdown`.
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!("[UdpWorker:{}] Thread panicked", self.hand);
        }
    }
}

/// Resolve the bind address for one hand.
pub fn bind_addr(config: &NetworkConfig, hand: Hand) -> Result<SocketAddr, AcquisitionError> {
    let ip: IpAddr = config
        .bind_ip
        .parse()
        .map_err(|_| AcquisitionError::InvalidAddress(config.bind_ip.clone()))?;
    let port = match hand {
        Hand::Left => config.left_port,
        Hand::Right => config.right_port,
    };
    Ok(SocketAddr::new(ip, port))
}

/// Open a reusable datagram socket with an enlarged receive buffer.
pub fn open_socket(
    addr: SocketAddr,
    recv_buffer: usize,
    read_timeout: Duration,
) -> Result<UdpSocket, AcquisitionError> {
    let bind_err = |source| AcquisitionError::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    // The OS may clamp or refuse the size; neither is fatal.
    if let Err(e) = socket.set_recv_buffer_size(recv_buffer) {
        debug!(error = %e, "SO_RCVBUF not applied");
    }
    socket.bind(&addr.into()).map_err(bind_err)?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(read_timeout)).map_err(bind_err)?;
    Ok(socket)
}

/// Spawn the receive thread for one hand.
pub fn spawn_glove_worker(
    hand: Hand,
    config: &NetworkConfig,
    adc_max: u16,
    status: Arc<RuntimeStatus>,
    sender: BridgeSender<SensorFrame>,
) -> Result<GloveWorker, AcquisitionError> {
    let addr = bind_addr(config, hand)?;
    let recv_buffer = config.recv_buffer_bytes;
    let read_timeout = config.read_timeout();
    let stats = Arc::new(WorkerStats::default());

    let thread = {
        let stats = Arc::clone(&stats);
        std::thread::Builder::new()
            .name(format!("udp-{hand}"))
            .spawn(move || {
                receive_loop(hand, addr, recv_buffer, read_timeout, adc_max, &status, &sender, &stats)
            })
            .map_err(AcquisitionError::Spawn)?
    };

    Ok(GloveWorker { hand, stats, thread })
}

#[allow(clippy::too_many_arguments)]
fn receive_loop(
    hand: Hand,
    addr: SocketAddr,
    recv_buffer: usize,
    read_timeout: Duration,
    adc_max: u16,
    status: &RuntimeStatus,
    sender: &BridgeSender<SensorFrame>,
    stats: &WorkerStats,
) {
    let mut buf = [0u8; GLOVE_RECV_BUFFER];

    while status.wait_until_enabled(Input::Glove) {
        let socket = match open_socket(addr, recv_buffer, read_timeout) {
            Ok(s) => s,
            Err(e) => {
                warn!("[UdpWorker:{}] {}, retrying", hand, e);
                std::thread::sleep(REBIND_BACKOFF);
                continue;
            }
        };
        info!("[UdpWorker:{}] Listening on {}", hand, addr);

        while status.is_running() && status.is_enabled(Input::Glove) {
            let len = match socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("[UdpWorker:{}] Receive failed: {}", hand, e);
                    break;
                }
            };

            let Some(frame) = parse_datagram(hand, &buf[..len], adc_max) else {
                stats.malformed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            stats.received.fetch_add(1, Ordering::Relaxed);

            if sender.send(frame).is_err() {
                debug!("[UdpWorker:{}] Consumer gone, exiting", hand);
                return;
            }
        }

        // Socket drops here; the port is released while disabled.
        info!("[UdpWorker:{}] Paused", hand);
    }

    info!("[UdpWorker:{}] Stopped", hand);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::encode_datagram;
    use crate::bridge;

    #[test]
    fn test_bind_addr_selects_port_by_hand() {
        let config = NetworkConfig::default();
        assert_eq!(bind_addr(&config, Hand::Left).unwrap().port(), 5005);
        assert_eq!(bind_addr(&config, Hand::Right).unwrap().port(), 5006);
    }

    #[test]
    fn test_bind_addr_rejects_garbage_ip() {
        let config = NetworkConfig {
            bind_ip: "not-an-ip".to_string(),
            ..NetworkConfig::default()
        };
        assert!(matches!(
            bind_addr(&config, Hand::Left),
            Err(AcquisitionError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_worker_delivers_frames_and_stops_on_shutdown() {
        // Port 0 lets the OS choose; find it by binding a throwaway socket first.
        let scratch = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = scratch.local_addr().unwrap().port();
        drop(scratch);

        let config = NetworkConfig {
            bind_ip: "127.0.0.1".to_string(),
            left_port: port,
            right_port: port.wrapping_add(1),
            read_timeout_ms: 20,
            ..NetworkConfig::default()
        };
        let status = Arc::new(RuntimeStatus::new(true, false));
        let (tx, mut rx) = bridge::channel(4);
        let worker = spawn_glove_worker(Hand::Left, &config, 4095, Arc::clone(&status), tx).unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let packet = encode_datagram(1_000_000, &[100, 0, 0, 0, 0, 0], 4095);
        let frame = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                client.send_to(&packet, ("127.0.0.1", port)).unwrap();
                client.send_to(&packet[..8], ("127.0.0.1", port)).unwrap();
                if let Some(frame) = rx.try_recv_latest() {
                    return frame;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(frame.values[0], 100);
        assert_eq!(frame.timestamp, 1.0);

        let stats = Arc::clone(&worker.stats);
        status.shutdown();
        tokio::task::spawn_blocking(move || worker.join()).await.unwrap();
        assert!(stats.received() >= 1);
    }
}
