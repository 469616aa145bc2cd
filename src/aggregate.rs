//! Hourly aggregation onto the canonical (city, hour) grain.

use crate::model::{CanonicalRow, MeasurementTuple, Pollutant};
use crate::params::normalize;
use chrono::{DateTime, Timelike, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Truncate a timestamp to the start of its hour.
pub fn floor_to_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(0))
        .unwrap_or(time)
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub accepted: usize,
    pub dropped_time: usize,
    pub dropped_value: usize,
    pub unmapped: usize,
}

/// Accumulates readings per (city, hour) and pollutant, finalised to means.
///
/// Output rows are ordered by city, then hour.
#[derive(Debug, Default)]
pub struct HourlyAggregator {
    groups: BTreeMap<(String, DateTime<Utc>), [Mean; 7]>,
    unmapped_names: BTreeSet<String>,
    stats: AggregateStats,
}

impl HourlyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_tuple(&mut self, tuple: MeasurementTuple) {
        let Some(time) = tuple.time else {
            self.stats.dropped_time += 1;
            return;
        };
        let Some(value) = tuple.value.filter(|v| v.is_finite()) else {
            self.stats.dropped_value += 1;
            return;
        };

        let parameter = normalize(&tuple.parameter);
        let Some(pollutant) = Pollutant::from_column(&parameter) else {
            self.stats.unmapped += 1;
            self.unmapped_names.insert(parameter);
            return;
        };

        self.stats.accepted += 1;
        self.group(tuple.city, time)[pollutant.index()].add(value);
    }

    /// Fold an already-wide row into the grid. Absent columns contribute
    /// nothing to the mean.
    pub fn push_row(&mut self, row: CanonicalRow) {
        let values: Vec<(Pollutant, f64)> = Pollutant::ALL
            .into_iter()
            .filter_map(|p| row.get(p).filter(|v| v.is_finite()).map(|v| (p, v)))
            .collect();

        self.stats.accepted += 1;
        let group = self.group(row.city, row.time);
        for (pollutant, value) in values {
            group[pollutant.index()].add(value);
        }
    }

    pub fn finish(self) -> (Vec<CanonicalRow>, AggregateStats) {
        if !self.unmapped_names.is_empty() {
            debug!(
                "Ignored {} readings for non-canonical parameters: {:?}",
                self.stats.unmapped, self.unmapped_names
            );
        }

        let rows = self
            .groups
            .into_iter()
            .map(|((city, time), means)| {
                let mut row = CanonicalRow::empty(city, time);
                for pollutant in Pollutant::ALL {
                    row.set(pollutant, means[pollutant.index()].value());
                }
                row
            })
            .collect();

        (rows, self.stats)
    }

    fn group(&mut self, city: String, time: DateTime<Utc>) -> &mut [Mean; 7] {
        self.groups
            .entry((city, floor_to_hour(time)))
            .or_default()
    }
}

impl Extend<MeasurementTuple> for HourlyAggregator {
    fn extend<I: IntoIterator<Item = MeasurementTuple>>(&mut self, iter: I) {
        for tuple in iter {
            self.push_tuple(tuple);
        }
    }
}

/// Collapse raw tuples into one wide row per (city, hour).
pub fn aggregate(tuples: impl IntoIterator<Item = MeasurementTuple>) -> Vec<CanonicalRow> {
    let mut aggregator = HourlyAggregator::new();
    aggregator.extend(tuples);
    aggregator.finish().0
}
