//! Shared handle around the aggregator.
//!
//! The connection task writes through it and the presentation side reads
//! snapshots from it. Every access takes the lock for one whole operation, so
//! readers never observe a half-applied ingest.

use std::sync::{Arc, Mutex, MutexGuard};

use super::aggregator::{IngestOutcome, IngestStats, TelemetryAggregator};
use super::sample::Position;
use super::series::SeriesSnapshot;
use crate::error::Result;

/// Cloneable, thread-safe aggregator handle
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<TelemetryAggregator>>,
}

impl TelemetryStore {
    pub fn new(aggregator: TelemetryAggregator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryAggregator> {
        // A panic mid-ingest cannot leave a group misaligned, so the state is
        // still usable after poisoning.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive access to the aggregator
    pub fn with<R>(&self, f: impl FnOnce(&mut TelemetryAggregator) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn ingest(&self, raw: &str) -> Result<IngestOutcome> {
        self.lock().ingest(raw)
    }

    pub fn clear_all_series(&self) {
        self.lock().clear_all_series();
    }

    pub fn go_live(&self) {
        self.lock().go_live();
    }

    pub fn esc_series(&self) -> SeriesSnapshot {
        self.lock().esc_series()
    }

    pub fn telemetry_series(&self) -> SeriesSnapshot {
        self.lock().telemetry_series()
    }

    pub fn position(&self) -> Position {
        self.lock().position()
    }

    pub fn stats(&self) -> IngestStats {
        self.lock().stats()
    }
}
