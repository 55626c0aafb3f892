//! Sensor-to-object fusion
//!
//! Touch events carry only a hand and sensor. Fusion looks up where that
//! sensor's fingertip is in the camera frame, finds the object under it
//! ([`ObjectMapper`]) and smooths the answer over time ([`ObjectBinder`]).

pub mod geometry;
mod binder;
mod mapper;

pub use binder::ObjectBinder;
pub use geometry::{is_degenerate, polygon_area, PreparedPolygon};
pub use mapper::ObjectMapper;
