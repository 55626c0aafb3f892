//! Thread-to-task bridge
//!
//! `BridgeSender::send` is callable from any OS thread. It never polls or
//! wakes the receiving task directly: items land in a bounded buffer and
//! the receiver's `Notify` stores a permit that the task consumes on its
//! next await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Returned by `send` once the receiver has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("bridge receiver dropped")]
pub struct BridgeClosed;

struct Buffer<T> {
    items: VecDeque<T>,
    senders: usize,
    receiver_alive: bool,
    dropped: u64,
}

struct Shared<T> {
    buffer: Mutex<Buffer<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Buffer<T>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a bridge whose buffer holds at most `capacity` items (minimum 1).
pub fn channel<T>(capacity: usize) -> (BridgeSender<T>, BridgeReceiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        buffer: Mutex::new(Buffer {
            items: VecDeque::with_capacity(capacity),
            senders: 1,
            receiver_alive: true,
            dropped: 0,
        }),
        notify: Notify::new(),
        capacity,
    });
    (
        BridgeSender {
            shared: Arc::clone(&shared),
        },
        BridgeReceiver { shared },
    )
}

/// Thread-side handle. Cloning adds a sender.
pub struct BridgeSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> BridgeSender<T> {
    /// Enqueue an item, evicting the oldest buffered one when full.
    pub fn send(&self, item: T) -> Result<(), BridgeClosed> {
        {
            let mut buf = self.shared.lock();
            if !buf.receiver_alive {
                return Err(BridgeClosed);
            }
            if buf.items.len() == self.shared.capacity {
                buf.items.pop_front();
                buf.dropped += 1;
            }
            buf.items.push_back(item);
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.lock().receiver_alive
    }
}

impl<T> Clone for BridgeSender<T> {
    fn clone(&self) -> Self {
        self.shared.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for BridgeSender<T> {
    fn drop(&mut self) {
        let last = {
            let mut buf = self.shared.lock();
            buf.senders -= 1;
            buf.senders == 0
        };
        if last {
            self.shared.notify.notify_one();
        }
    }
}

/// Task-side handle.
pub struct BridgeReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> BridgeReceiver<T> {
    /// Wait for data, then drain the buffer and return only the newest item.
    ///
    /// Returns `None` once every sender is gone and nothing is buffered.
    pub async fn recv_latest(&mut self) -> Option<T> {
        loop {
            {
                let mut buf = self.shared.lock();
                if let Some(latest) = buf.items.pop_back() {
                    buf.items.clear();
                    return Some(latest);
                }
                if buf.senders == 0 {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking variant of [`recv_latest`](Self::recv_latest).
    pub fn try_recv_latest(&mut self) -> Option<T> {
        let mut buf = self.shared.lock();
        let latest = buf.items.pop_back();
        buf.items.clear();
        latest
    }

    /// Items evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl<T> Drop for BridgeReceiver<T> {
    fn drop(&mut self) {
        let mut buf = self.shared.lock();
        buf.receiver_alive = false;
        buf.items.clear();
    }
}
