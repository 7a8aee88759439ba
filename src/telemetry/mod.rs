//! # Telemetry Module
//!
//! Turns raw telemetry messages into bounded, index-aligned time series.
//!
//! This module handles:
//! - Decoding JSON payloads (bare or wrapped in a `payload` envelope)
//! - Classifying samples into the ESC, position or telemetry group
//! - Appending to fixed-capacity series with oldest-first eviction
//! - Tracking the last known position and the live/replay mode

pub mod aggregator;
pub mod sample;
pub mod series;
pub mod store;

pub use aggregator::{AggregatorSettings, DashboardMode, IngestOutcome, IngestStats, TelemetryAggregator};
pub use sample::{ClassificationRules, ClassifiedSample, Position, SampleGroup, TelemetrySample};
pub use series::{SeriesSnapshot, MAX_DATA_POINTS};
pub use store::TelemetryStore;
