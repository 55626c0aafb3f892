//! Tracked physical objects
//!
//! - [`tracked`]: one object and its area-plausibility gate
//! - [`mapping`]: per-object (hand, sensor) → sound tables and bulk edits
//! - [`registry`]: the shared table, geometry snapshots and event dispatch

pub mod mapping;
pub mod registry;
pub mod tracked;

pub use mapping::{
    MappingAction, MappingError, MappingInfo, MappingRequest, MappingResult, MappingStatus, SoundMapping, Trigger,
    TriggerSink,
};
pub use registry::{AddReport, DetectionReport, DispatchOutcome, FlatObject, ObjectRegistry, RemoveReport};
pub use tracked::{GateOutcome, TrackedObject};
