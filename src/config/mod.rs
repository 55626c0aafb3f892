//! Engine Configuration Module
//!
//! Provides engine configuration loaded from TOML files, replacing
//! hardcoded tuning constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `TOUCHLOOP_CONFIG` environment variable (path to TOML file)
//! 2. `touchloop.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The loaded config is owned by the [`EngineContext`](crate::pipeline::EngineContext)
//! and handed to each component at construction; there is no global.
//!
//! ```ignore
//! let config = EngineConfig::load();
//! let (ctx, detections) = EngineContext::new(config, loader);
//! ```

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;
