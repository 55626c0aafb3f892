//! Glove data acquisition
//!
//! Receives raw pressure datagrams from the two gloves over UDP and hands
//! deframed [`SensorFrame`](crate::types::SensorFrame)s to the fusion tasks
//! through the thread bridge. No retry, ack or reordering: a lost or short
//! datagram is simply gone.

mod glove_packet;
mod udp_worker;

pub use glove_packet::{encode_datagram, parse_datagram};
pub use udp_worker::{bind_addr, open_socket, spawn_glove_worker, GloveWorker, WorkerStats};

use std::net::SocketAddr;

/// Acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}
