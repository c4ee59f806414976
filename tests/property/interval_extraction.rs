// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Active Interval Extraction

use gesha_telemetry::intervals::{active_intervals_historical, active_intervals_live};
use proptest::prelude::*;

/// Samples at strictly increasing timestamps with random activity
fn series_strategy() -> impl Strategy<Value = Vec<(i64, f64)>> {
    prop::collection::vec((1i64..50, prop::bool::ANY), 0..80).prop_map(|steps| {
        let mut timestamp = 0;
        steps
            .into_iter()
            .map(|(step, active)| {
                timestamp += step;
                (timestamp, if active { 1.0 } else { 0.0 })
            })
            .collect()
    })
}

proptest! {
    /// Property: intervals are ordered, non-overlapping and never inverted
    #[test]
    fn prop_intervals_are_ordered_and_disjoint(series in series_strategy(), lag in 0i64..1_000) {
        let now = series.last().map_or(0, |(t, _)| *t) + lag;

        for intervals in [active_intervals_live(&series, now), active_intervals_historical(&series)] {
            prop_assert!(intervals.iter().all(|i| i.start <= i.end));
            prop_assert!(intervals.windows(2).all(|pair| pair[0].end <= pair[1].start));
        }
    }

    /// Property: the variants differ only in how a trailing run is closed
    #[test]
    fn prop_variants_differ_only_in_trailing_run(series in series_strategy(), lag in 0i64..1_000) {
        let last = series.last().map_or(0, |(t, _)| *t);
        let live = active_intervals_live(&series, last + lag);
        let historical = active_intervals_historical(&series);

        prop_assert_eq!(live.len(), historical.len());

        let trailing_open = series.last().is_some_and(|(_, v)| *v > 0.0);
        for (index, (l, h)) in live.iter().zip(&historical).enumerate() {
            prop_assert_eq!(l.start, h.start);
            if trailing_open && index == live.len() - 1 {
                prop_assert_eq!(l.end, last + lag);
                prop_assert_eq!(h.end, last);
            } else {
                prop_assert_eq!(l.end, h.end);
            }
        }
    }

    /// Property: one interval per inactive-to-active transition
    #[test]
    fn prop_one_interval_per_rising_edge(series in series_strategy()) {
        let mut previous = false;
        let mut rising = 0;
        for (_, value) in &series {
            let active = *value > 0.0;
            if active && !previous {
                rising += 1;
            }
            previous = active;
        }

        prop_assert_eq!(active_intervals_historical(&series).len(), rising);
    }
}
