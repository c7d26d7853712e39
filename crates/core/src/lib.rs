//! Core utilities for the ember renderer.
//!
//! This crate provides foundational types and utilities used across the engine:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Engine configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    CameraSettings, EngineConfig, MAX_CASCADES, ShadowMode, ShadowSettings, WindowSettings,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
