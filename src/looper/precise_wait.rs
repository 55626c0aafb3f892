//! Bounded sleep-then-spin wait
//!
//! Cooperative timers wake a little early; this closes the remaining gap on
//! the calling thread. Coarse sleeps cover anything above `spin_window`,
//! then half-interval sleeps, then a pure spin for the last 200 µs.

use std::time::{Duration, Instant};

const PURE_SPIN: Duration = Duration::from_micros(200);

/// Block until `target`. Returns immediately when `target` has passed.
pub fn precise_wait(target: Instant, spin_window: Duration) {
    loop {
        let now = Instant::now();
        if now >= target {
            return;
        }
        let remaining = target - now;
        if remaining > spin_window {
            std::thread::sleep(remaining - spin_window);
        } else if remaining > PURE_SPIN {
            std::thread::sleep(remaining / 2);
        } else {
            std::hint::spin_loop();
        }
    }
}
