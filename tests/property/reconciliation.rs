// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for History Reconciliation

use gesha_telemetry::buffer::RingBuffer;
use gesha_telemetry::measurement::ValueChange;
use gesha_telemetry::reconcile::{collapse_unchanged, merge_history, reconcile_buffer};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

fn series_strategy() -> impl Strategy<Value = Vec<ValueChange>> {
    prop::collection::vec((0i64..500, 0u8..5), 0..60).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(timestamp, value)| ValueChange::new(timestamp, f64::from(value)))
            .collect()
    })
}

fn timestamps(series: &[ValueChange]) -> Vec<i64> {
    series.iter().map(|change| change.timestamp).collect()
}

proptest! {
    /// Property: merged output is strictly ascending, so no timestamp repeats
    #[test]
    fn prop_merge_has_no_duplicate_timestamps(
        live in series_strategy(),
        historical in series_strategy(),
    ) {
        let merged = merge_history(&live, &historical);

        prop_assert!(timestamps(&merged).windows(2).all(|pair| pair[0] < pair[1]));
    }

    /// Property: merged length equals the distinct union of timestamps
    #[test]
    fn prop_merge_length_is_distinct_union(
        live in series_strategy(),
        historical in series_strategy(),
    ) {
        let merged = merge_history(&live, &historical);
        let union: BTreeSet<i64> = live.iter().chain(&historical).map(|c| c.timestamp).collect();

        prop_assert_eq!(merged.len(), union.len());
    }

    /// Property: a live value always wins over a historical one
    #[test]
    fn prop_live_values_win(
        live in series_strategy(),
        historical in series_strategy(),
    ) {
        let merged = merge_history(&live, &historical);
        let last_live: HashMap<i64, f64> = live.iter().map(|c| (c.timestamp, c.value)).collect();

        for change in merged {
            if let Some(value) = last_live.get(&change.timestamp) {
                prop_assert_eq!(change.value, *value);
            }
        }
    }

    /// Property: reconciling again with an empty history changes nothing
    #[test]
    fn prop_empty_history_is_noop_after_reconcile(
        live in series_strategy(),
        historical in series_strategy(),
        capacity in 1usize..80,
    ) {
        let mut buffer = RingBuffer::new(capacity);
        buffer.extend(live);
        reconcile_buffer(&mut buffer, &historical);
        let reconciled = buffer.values();

        reconcile_buffer(&mut buffer, &[]);

        prop_assert_eq!(buffer.values(), reconciled);
    }

    /// Property: collapsed series never repeats a value back to back
    #[test]
    fn prop_collapse_removes_consecutive_repeats(series in series_strategy()) {
        let collapsed = collapse_unchanged(series.clone());

        prop_assert!(collapsed.windows(2).all(|pair| pair[0].value != pair[1].value));
        prop_assert_eq!(collapsed.first(), series.first());
        prop_assert_eq!(collapse_unchanged(collapsed.clone()), collapsed);
    }
}
