// Differential consumption from cumulative counters
use crate::domain::telemetry::Sample;

/// Samples within this distance of a boundary instant count as that boundary.
pub const BOUNDARY_TOLERANCE_MS: i64 = 60_000;

/// How many candidate readings a boundary query asks the source for.
pub const BOUNDARY_LIMIT: u32 = 5;

/// Consumption between two boundary readings of an accumulator.
///
/// Without an end reading the period cannot be reported (`None`). Without a
/// start reading there is no baseline and the result is floored at zero.
/// Counter resets and rollovers produce a negative raw delta, which is
/// clamped to zero.
pub fn interval_delta(start: Option<&Sample>, end: Option<&Sample>) -> Option<f64> {
    let end = end?;
    match start {
        None => Some(0.0),
        Some(start) => Some((end.value - start.value).max(0.0)),
    }
}

/// Pick the boundary reading for `target_ms` from best-effort candidates.
///
/// Any sample within `tolerance_ms` of the target qualifies; the most recent
/// qualifying sample wins.
pub fn select_boundary(samples: &[Sample], target_ms: i64, tolerance_ms: i64) -> Option<Sample> {
    samples
        .iter()
        .filter(|s| s.has_data && s.timestamp_ms.abs_diff(target_ms) <= tolerance_ms.unsigned_abs())
        .max_by_key(|s| s.timestamp_ms)
        .copied()
}

/// Consumption over a whole range of accumulator readings.
///
/// A single reading is taken as the amount accumulated since the period
/// started.
pub fn total_over_range(samples: &[Sample]) -> f64 {
    let mut readings: Vec<&Sample> = samples.iter().filter(|s| s.has_data).collect();
    readings.sort_by_key(|s| s.timestamp_ms);

    match readings.as_slice() {
        [] => 0.0,
        [only] => only.value,
        [first, .., last] => (last.value - first.value).max(0.0),
    }
}

/// Per-interval consumption between consecutive accumulator readings.
///
/// Each contribution is stamped with the later reading's timestamp, so it
/// lands in the slot where the consumption was observed. Pairs involving a
/// reading without data contribute an empty sample rather than a zero.
pub fn consumption_contributions(samples: &[Sample]) -> Vec<Sample> {
    let mut ordered: Vec<Sample> = samples.to_vec();
    ordered.sort_by_key(|s| s.timestamp_ms);

    ordered
        .windows(2)
        .map(|pair| {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.has_data && next.has_data {
                let delta = interval_delta(Some(prev), Some(next)).unwrap_or(0.0);
                Sample::new(next.timestamp_ms, delta)
            } else {
                Sample::empty(next.timestamp_ms)
            }
        })
        .collect()
}
