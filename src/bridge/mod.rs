//! Queue Bridge - handoff between worker threads and the async runtime
//!
//! Two primitives, both bounded and both keeping only what is fresh:
//!
//! - [`LatestQueue`]: a blocking, capacity-bounded queue for thread consumers
//!   (or for async code that only ever peeks). Pushing into a full queue
//!   evicts the oldest item. Consumers may peek without consuming, take the
//!   newest while discarding the rest, or block until a strictly newer item
//!   arrives.
//! - [`channel`]: a thread-to-task bridge. Senders run on any thread and
//!   never touch the receiving task directly; they push into a drop-oldest
//!   buffer and wake the task through `tokio::sync::Notify`. The receiving
//!   task only ever sees the most recent item.

mod latest_queue;
mod thread_bridge;

pub use latest_queue::{LatestQueue, Versioned};
pub use thread_bridge::{channel, BridgeClosed, BridgeReceiver, BridgeSender};
