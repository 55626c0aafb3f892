//! Sticky sensor → object binding
//!
//! Landmark jitter near object edges makes the mapper's answer flicker.
//! The binder only lets a sensor's binding change once the previous
//! change is at least `dwell` old.

use std::collections::HashMap;

use crate::types::{ObjectId, SensorKey, TouchEvent};

#[derive(Debug, Clone, Copy, Default)]
struct BindState {
    bound: Option<ObjectId>,
    unlock_at: f64,
    last_seen: f64,
}

pub struct ObjectBinder {
    dwell: f64,
    states: HashMap<SensorKey, BindState>,
}

impl ObjectBinder {
    pub fn new(dwell_ms: f64) -> Self {
        Self {
            dwell: dwell_ms.max(0.0) / 1000.0,
            states: HashMap::new(),
        }
    }

    /// Resolve the candidate from the mapper into the bound object.
    ///
    /// Without a sensor key there is nothing to stick to, so the candidate
    /// passes through untouched.
    pub fn resolve(&mut self, key: Option<SensorKey>, candidate: Option<ObjectId>, now: f64) -> Option<ObjectId> {
        let Some(key) = key else {
            return candidate;
        };
        let st = self.states.entry(key).or_default();

        // A clock that went backwards can't be compared against unlock_at.
        if now < st.last_seen {
            st.unlock_at = now;
        }
        st.last_seen = now;

        if st.bound != candidate && now >= st.unlock_at {
            st.bound = candidate;
            st.unlock_at = now + self.dwell;
        }
        st.bound
    }

    /// Replace each event's mapped object with the bound one.
    pub fn bind_events(&mut self, events: &mut [TouchEvent]) {
        for event in events.iter_mut() {
            event.object_id = self.resolve(Some(event.key()), event.object_id, event.timestamp);
        }
    }

    pub fn bound(&self, key: SensorKey) -> Option<ObjectId> {
        self.states.get(&key).and_then(|s| s.bound)
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}
