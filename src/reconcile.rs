// Copyright (c) 2025 - Cowboy AI, Inc.
//! History reconciliation
//!
//! Merges a bulk historical result with a buffer already populated by the
//! live stream.
//!
//! ```text
//! historical:  t1=90  t2=91  t3=92
//! live:                      t3=93  t4=94
//!                            ──────
//! merged:      t1=90  t2=91  t3=93  t4=94   (live wins on collision)
//! ```
//!
//! The controller reports most signals only when they change, so historical
//! rows are collapsed to genuine transitions before merging. Otherwise a
//! quiescent signal would fill the bounded buffer with identical samples.
//!
//! Merging is keyed by timestamp, never by arrival order: pub/sub delivery
//! across topics is not globally ordered.

use std::collections::BTreeMap;

use crate::buffer::RingBuffer;
use crate::measurement::{Measurement, ValueChange};
use crate::topics::Signal;

/// Merge historical and live samples into one ascending, de-duplicated series
///
/// Live values win when both sides carry the same timestamp.
pub fn merge_history(live: &[ValueChange], historical: &[ValueChange]) -> Vec<ValueChange> {
    let mut merged: BTreeMap<i64, f64> = historical
        .iter()
        .map(|change| (change.timestamp, change.value))
        .collect();

    merged.extend(live.iter().map(|change| (change.timestamp, change.value)));

    merged
        .into_iter()
        .map(|(timestamp, value)| ValueChange::new(timestamp, value))
        .collect()
}

/// Drop samples whose value equals the previous sample's value
pub fn collapse_unchanged<I>(series: I) -> Vec<ValueChange>
where
    I: IntoIterator<Item = ValueChange>,
{
    let mut collapsed: Vec<ValueChange> = Vec::new();

    for change in series {
        if collapsed.last().map(|last| last.value) != Some(change.value) {
            collapsed.push(change);
        }
    }

    collapsed
}

/// Merge `historical` into `buffer` and reload it in ascending order
///
/// Returns the number of samples held afterwards.
pub fn reconcile_buffer(buffer: &mut RingBuffer<ValueChange>, historical: &[ValueChange]) -> usize {
    let merged = merge_history(&buffer.values(), historical);
    buffer.load(merged);
    buffer.len()
}

/// Historical measurement rows split into per-signal transition series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalSeries {
    pub boiler: Vec<ValueChange>,
    pub grouphead: Vec<ValueChange>,
    pub thermofilter: Vec<ValueChange>,
    pub boiler_level: Vec<ValueChange>,
}

impl HistoricalSeries {
    pub fn from_measurements(measurements: &[Measurement]) -> Self {
        fn series(
            measurements: &[Measurement],
            value: impl Fn(&Measurement) -> Option<f64>,
        ) -> Vec<ValueChange> {
            collapse_unchanged(
                measurements
                    .iter()
                    .filter_map(|m| value(m).map(|v| ValueChange::new(m.time, v))),
            )
        }

        Self {
            boiler: series(measurements, |m| Some(m.boiler_temp_c)),
            grouphead: series(measurements, |m| Some(m.grouphead_temp_c)),
            thermofilter: series(measurements, |m| m.thermofilter_temp_c),
            boiler_level: series(measurements, |m| m.heat_level),
        }
    }

    /// Historical series for `signal`, if the history carries it
    pub fn get(&self, signal: Signal) -> Option<&[ValueChange]> {
        match signal {
            Signal::BoilerTemperature => Some(&self.boiler),
            Signal::GroupheadTemperature => Some(&self.grouphead),
            Signal::ThermofilterTemperature => Some(&self.thermofilter),
            Signal::BoilerLevel => Some(&self.boiler_level),
            Signal::PredictedThermofilterTemperature => None,
        }
    }

    /// Signals with at least one historical sample
    pub fn populated(&self) -> impl Iterator<Item = (Signal, &[ValueChange])> + '_ {
        Signal::ALL.into_iter().filter_map(move |signal| {
            self.get(signal)
                .filter(|series| !series.is_empty())
                .map(|series| (signal, series))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.populated().next().is_none()
    }
}
