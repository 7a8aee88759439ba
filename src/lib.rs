//! # Drone Dashboard Library
//!
//! Live telemetry client for a drone/ESC system.
//!
//! This library keeps a single WebSocket connection to the telemetry source
//! alive, and turns the JSON messages it receives into bounded time series
//! (ESC voltage/current/RPM, altitude/speed) plus the last known position,
//! ready for a presentation layer to render.

pub mod config;
pub mod connection;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod telemetry;
