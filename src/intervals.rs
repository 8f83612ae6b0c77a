//! # Interval Tiler
//! Pure, testable logic that partitions a `[start, end)` time range into
//! contiguous fixed-length intervals. No I/O, suitable for unit tests and
//! deterministic task-set construction.

use chrono::{Duration, NaiveDateTime};

/// Partition `[start, end)` into contiguous intervals of `interval_minutes`.
///
/// Each interval's start equals the previous interval's end; the last interval
/// is truncated so its end equals `end` exactly. `start >= end` (and a zero
/// interval length) yield an empty sequence rather than an error.
pub fn tile(
    start: NaiveDateTime,
    end: NaiveDateTime,
    interval_minutes: u32,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut intervals = Vec::new();
    if interval_minutes == 0 {
        return intervals;
    }
    let step = Duration::minutes(i64::from(interval_minutes));
    let mut current = start;
    while current < end {
        let mut next = current + step;
        if next > end {
            next = end;
        }
        intervals.push((current, next));
        current = next;
    }
    intervals
}
