//! Runtime run/enable flags shared by worker threads and async tasks
//!
//! Flags are plain atomics so the hot paths read them without locking. The
//! mutex/condvar pair exists only so disabled workers can sleep until a flag
//! flips; every flip broadcasts.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Which input a worker waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Input {
    Glove,
    Vision,
}

/// Serializable view of the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub glove_enabled: bool,
    pub vision_enabled: bool,
}

pub struct RuntimeStatus {
    running: AtomicBool,
    glove_enabled: AtomicBool,
    vision_enabled: AtomicBool,
    gate: Mutex<()>,
    changed: Condvar,
}

impl RuntimeStatus {
    pub fn new(glove_enabled: bool, vision_enabled: bool) -> Self {
        Self {
            running: AtomicBool::new(true),
            glove_enabled: AtomicBool::new(glove_enabled),
            vision_enabled: AtomicBool::new(vision_enabled),
            gate: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self, input: Input) -> bool {
        self.flag(input).load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, input: Input, enabled: bool) {
        self.flag(input).store(enabled, Ordering::Release);
        self.broadcast();
    }

    /// Clear the run flag and wake every blocked worker.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.broadcast();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.is_running(),
            glove_enabled: self.is_enabled(Input::Glove),
            vision_enabled: self.is_enabled(Input::Vision),
        }
    }

    /// Block the calling thread until `input` is enabled or the runtime stops.
    ///
    /// Returns `true` when enabled, `false` when the runtime is shutting down.
    pub fn wait_until_enabled(&self, input: Input) -> bool {
        let mut guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if !self.is_running() {
                return false;
            }
            if self.is_enabled(input) {
                return true;
            }
            // The timeout only bounds a missed wake-up; flips always notify.
            guard = match self.changed.wait_timeout(guard, Duration::from_secs(1)) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn flag(&self, input: Input) -> &AtomicBool {
        match input {
            Input::Glove => &self.glove_enabled,
            Input::Vision => &self.vision_enabled,
        }
    }

    fn broadcast(&self) {
        // Taking the gate orders the flag store before any waiter's re-check.
        let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        self.changed.notify_all();
    }
}

impl Default for RuntimeStatus {
    fn default() -> Self {
        Self::new(true, true)
    }
}
