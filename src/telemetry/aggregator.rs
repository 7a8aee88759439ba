//! # Telemetry Aggregator
//!
//! Owns all series state and the current position. Each call to
//! [`TelemetryAggregator::ingest`] is applied completely (parse, classify,
//! append, truncate) before it returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::sample::{
    decode_sample, display_label, ClassificationRules, ClassifiedSample, Position,
};
use super::series::{SeriesGroup, SeriesSnapshot};
use crate::error::Result;

/// Dataset names of the ESC group
pub const ESC_DATASETS: [&str; 3] = ["Voltage", "Current", "RPM"];

/// Dataset names of the telemetry group
pub const TELEMETRY_DATASETS: [&str; 2] = ["Altitude", "Speed"];

/// Cosmetic source mode shown in the chart title
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum DashboardMode {
    #[default]
    Live,
    Replay(String),
}

impl DashboardMode {
    /// Chart title for this mode
    pub fn title(&self) -> String {
        match self {
            DashboardMode::Live => "Drone Data - Live Mode".to_string(),
            DashboardMode::Replay(file) => format!("Drone Data - Replay: {} Mode", file),
        }
    }
}

/// What an ingest did with a well-formed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Esc,
    Position,
    Telemetry,
    Unrecognized,
}

/// Running counts of ingested messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub malformed: u64,
    pub unrecognized: u64,
}

/// Aggregator settings
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub max_data_points: usize,
    pub fallback_position: Position,
    pub rules: ClassificationRules,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            max_data_points: super::series::MAX_DATA_POINTS,
            fallback_position: Position { latitude: 55.7558, longitude: 37.6176 },
            rules: ClassificationRules::default(),
        }
    }
}

/// Series and position state fed by raw telemetry messages
#[derive(Debug, Clone)]
pub struct TelemetryAggregator {
    esc: SeriesGroup<3>,
    telemetry: SeriesGroup<2>,
    position: Position,
    mode: DashboardMode,
    rules: ClassificationRules,
    stats: IngestStats,
}

impl TelemetryAggregator {
    pub fn new(settings: AggregatorSettings) -> Self {
        Self {
            esc: SeriesGroup::new(ESC_DATASETS, settings.max_data_points),
            telemetry: SeriesGroup::new(TELEMETRY_DATASETS, settings.max_data_points),
            position: settings.fallback_position,
            mode: DashboardMode::Live,
            rules: settings.rules,
            stats: IngestStats::default(),
        }
    }

    /// Ingest a raw message received now
    pub fn ingest(&mut self, raw: &str) -> Result<IngestOutcome> {
        self.ingest_at(raw, Utc::now())
    }

    /// Ingest a raw message received at `received_at`
    ///
    /// # Errors
    ///
    /// Returns a decode error if the text is not a JSON object of the
    /// expected shape. No state other than the malformed counter changes.
    pub fn ingest_at(&mut self, raw: &str, received_at: DateTime<Utc>) -> Result<IngestOutcome> {
        let sample = match decode_sample(raw) {
            Ok(sample) => sample,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Dropping malformed telemetry message: {}", e);
                return Err(e);
            }
        };

        let label = display_label(sample.timestamp, received_at);

        let outcome = match self.rules.classify(&sample) {
            ClassifiedSample::Esc(esc) => {
                self.esc.push(label, [esc.voltage, esc.current, esc.rpm]);
                IngestOutcome::Esc
            }
            ClassifiedSample::Position(fix) => {
                self.position = fix.position;
                self.telemetry.push(label, [fix.flight.altitude, fix.flight.speed]);
                IngestOutcome::Position
            }
            ClassifiedSample::Telemetry(flight) => {
                self.telemetry.push(label, [flight.altitude, flight.speed]);
                IngestOutcome::Telemetry
            }
            ClassifiedSample::Unrecognized => {
                self.stats.unrecognized += 1;
                warn!("Received message without expected fields: {}", raw);
                return Ok(IngestOutcome::Unrecognized);
            }
        };

        self.stats.accepted += 1;
        debug!("Ingested {:?} sample", outcome);
        Ok(outcome)
    }

    /// Empty every group's labels and datasets; position is kept
    pub fn clear_all_series(&mut self) {
        self.esc.clear();
        self.telemetry.clear();
    }

    /// Clear all series and switch back to live mode
    pub fn go_live(&mut self) {
        self.clear_all_series();
        self.mode = DashboardMode::Live;
    }

    /// Clear all series and label the source as a replay of `file`
    pub fn start_replay(&mut self, file: &str) {
        self.clear_all_series();
        self.mode = DashboardMode::Replay(file.to_string());
    }

    pub fn esc_series(&self) -> SeriesSnapshot {
        self.esc.snapshot()
    }

    pub fn telemetry_series(&self) -> SeriesSnapshot {
        self.telemetry.snapshot()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn mode(&self) -> &DashboardMode {
        &self.mode
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Latest `[voltage, current, rpm]`
    pub fn latest_esc(&self) -> Option<[f64; 3]> {
        self.esc.latest()
    }

    /// Latest `[altitude, speed]`
    pub fn latest_telemetry(&self) -> Option<[f64; 2]> {
        self.telemetry.latest()
    }
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new(AggregatorSettings::default())
    }
}
