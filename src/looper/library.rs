//! Named loops and their recorded events

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::LoopError;
use crate::audio::SoundAsset;
use crate::config::defaults::DEFAULT_LOOP_NAME;

/// One recorded trigger, replayed once per cycle.
#[derive(Debug, Clone)]
pub struct LoopEvent {
    pub id: Uuid,
    /// Seconds from the cycle start, in `[0, cycle_secs)`.
    pub offset_secs: f64,
    pub asset: Arc<SoundAsset>,
    pub gain: f32,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Loop {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub events: Vec<LoopEvent>,
    pub created_at: DateTime<Utc>,
}

impl Loop {
    fn new(name: Option<&str>) -> Self {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_LOOP_NAME);
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            active: true,
            events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn info(&self) -> LoopInfo {
        LoopInfo {
            id: self.id,
            name: self.name.clone(),
            active: self.active,
            created_at: self.created_at,
            events: self
                .events
                .iter()
                .map(|e| LoopEventInfo {
                    id: e.id,
                    offset_secs: e.offset_secs,
                    path: e.asset.path().to_string(),
                    gain: e.gain,
                    label: e.label.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopEventInfo {
    pub id: Uuid,
    pub offset_secs: f64,
    pub path: String,
    pub gain: f32,
    pub label: Option<String>,
}

/// Serializable view of one loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopInfo {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub events: Vec<LoopEventInfo>,
}

/// All loops in creation order plus the recording selection.
#[derive(Debug, Default)]
pub struct LoopLibrary {
    loops: Vec<Loop>,
    selected: Option<Uuid>,
}

impl LoopLibrary {
    pub fn create(&mut self, name: Option<&str>) -> &Loop {
        let idx = self.loops.len();
        self.loops.push(Loop::new(name));
        &self.loops[idx]
    }

    pub fn list(&self) -> &[Loop] {
        &self.loops
    }

    pub fn get(&self, id: Uuid) -> Option<&Loop> {
        self.loops.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Result<&mut Loop, LoopError> {
        self.loops
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(LoopError::LoopNotFound(id))
    }

    pub fn select(&mut self, id: Uuid) -> Result<&Loop, LoopError> {
        let idx = self
            .loops
            .iter()
            .position(|l| l.id == id)
            .ok_or(LoopError::LoopNotFound(id))?;
        self.selected = Some(id);
        Ok(&self.loops[idx])
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    pub fn selected_id(&self) -> Option<Uuid> {
        self.selected
    }

    pub fn current(&self) -> Option<&Loop> {
        self.selected.and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, id: Uuid, active: bool) -> Result<&Loop, LoopError> {
        let lp = self.get_mut(id)?;
        lp.active = active;
        Ok(lp)
    }

    pub fn clear(&mut self, id: Uuid) -> Result<&Loop, LoopError> {
        let lp = self.get_mut(id)?;
        lp.events.clear();
        Ok(lp)
    }

    /// Remove a loop, dropping the selection if it pointed at it.
    pub fn delete(&mut self, id: Uuid) -> bool {
        let before = self.loops.len();
        self.loops.retain(|l| l.id != id);
        let removed = self.loops.len() != before;
        if removed && self.selected == Some(id) {
            self.selected = None;
        }
        removed
    }

    /// Append an event to the selected loop.
    pub fn record(&mut self, event: LoopEvent) -> Result<&Loop, LoopError> {
        let id = self.selected.ok_or(LoopError::NoLoopSelected)?;
        let lp = self.get_mut(id)?;
        lp.events.push(event);
        Ok(lp)
    }

    /// Active loops, for scheduling.
    pub fn active(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter().filter(|l| l.active)
    }
}
