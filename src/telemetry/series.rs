//! # Bounded Time Series
//!
//! A group of datasets sharing one label sequence, with keep-last-N
//! truncation applied to all sequences together.

use std::collections::VecDeque;

use serde::Serialize;

/// Default capacity of every series group
pub const MAX_DATA_POINTS: usize = 50;

/// Index-aligned datasets sharing a single label sequence
///
/// `N` is the number of datasets in the group. Appends take exactly `N`
/// values, so every dataset always has the same length as the labels.
#[derive(Debug, Clone)]
pub struct SeriesGroup<const N: usize> {
    names: [&'static str; N],
    labels: VecDeque<String>,
    values: [VecDeque<f64>; N],
    capacity: usize,
}

impl<const N: usize> SeriesGroup<N> {
    /// Create an empty group holding at most `capacity` points
    pub fn new(names: [&'static str; N], capacity: usize) -> Self {
        Self {
            names,
            labels: VecDeque::with_capacity(capacity + 1),
            values: std::array::from_fn(|_| VecDeque::with_capacity(capacity + 1)),
            capacity,
        }
    }

    /// Append one point to every dataset, evicting the oldest on overflow
    pub fn push(&mut self, label: String, values: [f64; N]) {
        self.labels.push_back(label);
        for (series, value) in self.values.iter_mut().zip(values) {
            series.push_back(value);
        }

        while self.labels.len() > self.capacity {
            self.labels.pop_front();
            for series in &mut self.values {
                series.pop_front();
            }
        }
    }

    /// Empty the labels and every dataset
    pub fn clear(&mut self) {
        self.labels.clear();
        for series in &mut self.values {
            series.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent values, one per dataset
    pub fn latest(&self) -> Option<[f64; N]> {
        if self.is_empty() {
            return None;
        }
        let mut out = [0.0; N];
        for (slot, series) in out.iter_mut().zip(&self.values) {
            *slot = series.back().copied().unwrap_or_default();
        }
        Some(out)
    }

    /// Owned copy of the current window for the presentation layer
    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            labels: self.labels.iter().cloned().collect(),
            datasets: self
                .names
                .iter()
                .zip(&self.values)
                .map(|(name, series)| DatasetSnapshot {
                    name: (*name).to_string(),
                    values: series.iter().copied().collect(),
                })
                .collect(),
        }
    }
}

/// One named dataset of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSnapshot {
    pub name: String,
    pub values: Vec<f64>,
}

/// Read-only copy of a series group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub labels: Vec<String>,
    pub datasets: Vec<DatasetSnapshot>,
}

impl SeriesSnapshot {
    /// Values of the dataset called `name`
    pub fn dataset(&self, name: &str) -> Option<&[f64]> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.values.as_slice())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
