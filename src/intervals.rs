// Copyright (c) 2025 - Cowboy AI, Inc.
//! Active interval extraction
//!
//! Turns a thresholded series into the closed periods during which it was
//! active (`value > 0`). The rendering layer draws these as heater duty-cycle
//! rectangles.
//!
//! ```text
//! value:   0  0  1  1  1  0  0  1  1
//! time:    0  1  2  3  4  5  6  7  8
//!                └───────┘     └────── open run
//! intervals: [2, 5)  and  [7, close)
//! ```
//!
//! A run still active at the end of the input is closed by one of two rules,
//! one per function:
//!
//! - [`active_intervals_live`]: closed at `now`, so an ongoing duty cycle
//!   keeps growing as time passes
//! - [`active_intervals_historical`]: closed at the last sample's timestamp,
//!   for replaying stored data

use serde::{Deserialize, Serialize};

use crate::measurement::ValueChange;

/// A contiguous active period, `start` inclusive and `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }
}

impl From<(i64, i64)> for Interval {
    fn from((start, end): (i64, i64)) -> Self {
        Self::new(start, end)
    }
}

/// A timestamped sample that is either active or inactive
pub trait Sample {
    fn timestamp(&self) -> i64;
    fn is_active(&self) -> bool;
}

impl Sample for ValueChange {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn is_active(&self) -> bool {
        ValueChange::is_active(self)
    }
}

impl Sample for (i64, f64) {
    fn timestamp(&self) -> i64 {
        self.0
    }

    fn is_active(&self) -> bool {
        self.1 > 0.0
    }
}

impl<S: Sample> Sample for &S {
    fn timestamp(&self) -> i64 {
        S::timestamp(*self)
    }

    fn is_active(&self) -> bool {
        S::is_active(*self)
    }
}

/// How to close a run that is still active when the input ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenRun {
    /// Close at the given wall-clock time
    UntilNow(i64),
    /// Close at the final sample's timestamp
    UntilLastSample,
}

/// Active intervals of a live series, closing an ongoing run at `now`
///
/// The end of an ongoing run is never earlier than its start.
pub fn active_intervals_live<I>(series: I, now: i64) -> Vec<Interval>
where
    I: IntoIterator,
    I::Item: Sample,
{
    extract(series, OpenRun::UntilNow(now))
}

/// Active intervals of a stored series, closing a trailing run at the last sample
pub fn active_intervals_historical<I>(series: I) -> Vec<Interval>
where
    I: IntoIterator,
    I::Item: Sample,
{
    extract(series, OpenRun::UntilLastSample)
}

fn extract<I>(series: I, open_run: OpenRun) -> Vec<Interval>
where
    I: IntoIterator,
    I::Item: Sample,
{
    let mut intervals = Vec::new();
    let mut open: Option<i64> = None;
    let mut last_timestamp = None;

    for sample in series {
        let timestamp = sample.timestamp();
        last_timestamp = Some(timestamp);

        match (open, sample.is_active()) {
            (None, true) => open = Some(timestamp),
            (Some(start), false) => {
                intervals.push(Interval::new(start, timestamp));
                open = None;
            }
            _ => {}
        }
    }

    if let (Some(start), Some(last)) = (open, last_timestamp) {
        let end = match open_run {
            OpenRun::UntilNow(now) => now.max(start),
            OpenRun::UntilLastSample => last,
        };
        intervals.push(Interval::new(start, end));
    }

    intervals
}
