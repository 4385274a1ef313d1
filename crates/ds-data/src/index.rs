//! Adaptive nearest-timestamp search over a table snapshot
//!
//! A [`TimestampIndex`] measures the table once at construction (row count,
//! start time, average step, sortedness, spacing) and then serves
//! `lookup(target)` queries through the cheapest strategy that fits: cursor
//! replay for sequential playback, a small interpolation neighborhood for
//! larger jumps over evenly spaced data, binary search otherwise. Every
//! strategy's result passes the same proximity gate before the cursor moves.
//!
//! The index is a point-in-time snapshot: rows appended to the table after
//! construction are invisible until a fresh index is built over the grown
//! table.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{error, warn};

use ds_core::{TimeseriesPoint, TimeseriesTable};

/// Tolerance for the even-spacing check, as a fraction of the average step.
const EVEN_SPACING_TOLERANCE_FACTOR: f64 = 0.01;
/// Tolerance factor for the final proximity gate.
const FINAL_PROXIMITY_FACTOR: f64 = 1.5;
/// Cursor scan window, in multiples of the average step.
const SCAN_WINDOW_STEPS: f64 = 3.0;
/// Half-width of the neighborhood scanned around an interpolation guess.
const INTERPOLATION_SCAN_RANGE: i64 = 3;

/// Which search strategy answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    Forward,
    Reverse,
    Interpolate,
    Binary,
}

/// Call count and cumulative latency for one strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyStats {
    pub calls: u64,
    pub total_time: Duration,
}

impl StrategyStats {
    pub fn average_time(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.calls as u32
        }
    }
}

/// Per-strategy diagnostics counters.
#[derive(Debug, Clone, Default)]
pub struct LookupStats {
    pub forward: StrategyStats,
    pub reverse: StrategyStats,
    pub interpolate: StrategyStats,
    pub binary: StrategyStats,
}

impl LookupStats {
    pub fn for_strategy(&self, strategy: LookupStrategy) -> &StrategyStats {
        match strategy {
            LookupStrategy::Forward => &self.forward,
            LookupStrategy::Reverse => &self.reverse,
            LookupStrategy::Interpolate => &self.interpolate,
            LookupStrategy::Binary => &self.binary,
        }
    }

    fn for_strategy_mut(&mut self, strategy: LookupStrategy) -> &mut StrategyStats {
        match strategy {
            LookupStrategy::Forward => &mut self.forward,
            LookupStrategy::Reverse => &mut self.reverse,
            LookupStrategy::Interpolate => &mut self.interpolate,
            LookupStrategy::Binary => &mut self.binary,
        }
    }

    /// Human-readable per-strategy summary for diagnostics panels.
    pub fn summary(&self) -> String {
        [
            ("forward", &self.forward),
            ("reverse", &self.reverse),
            ("interpolate", &self.interpolate),
            ("binary", &self.binary),
        ]
        .iter()
        .map(|(name, stats)| {
            format!(
                "{name}: {} calls, avg {:.4} ms",
                stats.calls,
                stats.average_time().as_secs_f64() * 1000.0
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
    }
}

/// Stateful nearest-timestamp search over one table snapshot.
pub struct TimestampIndex {
    table: Arc<RwLock<TimeseriesTable>>,

    // Snapshot statistics, fixed at construction.
    row_count: usize,
    start_time: f64,
    average_step: f64,
    is_sorted: bool,
    is_evenly_spaced: bool,

    // Cursor for sequential access.
    last_index: usize,
    last_timestamp: f64,

    stats: LookupStats,
}

impl TimestampIndex {
    /// Measure the table and build an index over its current rows.
    pub fn new(table: Arc<RwLock<TimeseriesTable>>) -> Self {
        let (row_count, start_time, average_step, is_sorted, is_evenly_spaced) = {
            let snapshot = table.read();
            let timestamps = snapshot.timestamps();
            let row_count = timestamps.len();

            if row_count == 0 {
                (0, 0.0, 0.0, true, true)
            } else {
                let is_sorted = check_sorted(timestamps);
                if !is_sorted {
                    error!("timestamps are not sorted, index degraded: every lookup will miss");
                }

                let start_time = timestamps[0];
                let end_time = timestamps[row_count - 1];
                let average_step = if row_count > 1 {
                    (end_time - start_time) / (row_count as f64 - 1.0)
                } else {
                    0.0
                };

                let is_evenly_spaced = if is_sorted && row_count > 1 {
                    let tolerance = average_step * EVEN_SPACING_TOLERANCE_FACTOR;
                    let even = check_even_spacing(timestamps, average_step, tolerance);
                    if !even {
                        warn!("timestamps are unevenly spaced, lookups fall back to binary search");
                    }
                    even
                } else {
                    row_count <= 1
                };

                (row_count, start_time, average_step, is_sorted, is_evenly_spaced)
            }
        };

        Self {
            table,
            row_count,
            start_time,
            average_step,
            is_sorted,
            is_evenly_spaced,
            last_index: 0,
            last_timestamp: start_time,
            stats: LookupStats::default(),
        }
    }

    /// Find the row nearest to `target`, or `None` when the table is empty,
    /// the index is degraded, or the nearest candidate fails the proximity
    /// gate. Successful lookups advance the cursor; rejected ones leave it
    /// untouched.
    pub fn lookup(&mut self, target: f64) -> Option<TimeseriesPoint> {
        let started = Instant::now();

        if self.row_count == 0 {
            return None;
        }

        let table = Arc::clone(&self.table);
        let table = table.read();

        if self.row_count == 1 {
            return table.point_at(0);
        }
        if !self.is_sorted {
            return None;
        }

        let timestamps = table.timestamps();

        // Uneven spacing invalidates the cursor and interpolation shortcuts.
        if !self.is_evenly_spaced {
            let found = self.binary_search_closest(timestamps, target);
            return self.finalize(&table, LookupStrategy::Binary, target, found, started);
        }

        let max_scan_delta = self.average_step * SCAN_WINDOW_STEPS;
        let mut index = self.last_index;

        // Forward replay, the common case of scrubbing forward in time.
        if target >= self.last_timestamp && target - self.last_timestamp <= max_scan_delta {
            while index < self.row_count - 1 && timestamps[index + 1] <= target {
                index += 1;
            }
            return self.finalize(&table, LookupStrategy::Forward, target, index, started);
        }

        // Reverse scrubbing.
        if target < self.last_timestamp && self.last_timestamp - target <= max_scan_delta {
            while index > 0 && timestamps[index - 1] >= target {
                index -= 1;
            }
            return self.finalize(&table, LookupStrategy::Reverse, target, index, started);
        }

        // Interpolation guess: estimate the position and scan a small
        // neighborhood around it.
        if self.average_step > 0.0 {
            let estimated = ((target - self.start_time) / self.average_step).floor() as i64;
            let search_start = (estimated - INTERPOLATION_SCAN_RANGE).max(0);
            let search_end = (estimated + INTERPOLATION_SCAN_RANGE).min(self.row_count as i64 - 1);

            if search_start <= search_end {
                let mut best_index = search_start as usize;
                let mut best_diff = (timestamps[best_index] - target).abs();
                for i in (search_start as usize + 1)..=(search_end as usize) {
                    let diff = (timestamps[i] - target).abs();
                    if diff < best_diff {
                        best_diff = diff;
                        best_index = i;
                    }
                }
                return self.finalize(&table, LookupStrategy::Interpolate, target, best_index, started);
            }
        }

        // Binary search fallback.
        let found = self.binary_search_closest(timestamps, target);
        self.finalize(&table, LookupStrategy::Binary, target, found, started)
    }

    /// Uniform post-search step: clamp, apply the proximity gate, advance the
    /// cursor and record stats only on acceptance.
    fn finalize(
        &mut self,
        table: &TimeseriesTable,
        strategy: LookupStrategy,
        target: f64,
        found_index: usize,
        started: Instant,
    ) -> Option<TimeseriesPoint> {
        let index = found_index.min(self.row_count - 1);
        let actual = table.timestamps()[index];

        let actual_diff = (actual - target).abs();
        let too_far = if self.average_step > 0.0 {
            actual_diff > FINAL_PROXIMITY_FACTOR * self.average_step
        } else {
            // Zero step means identical timestamps; require an exact match.
            actual_diff != 0.0
        };

        if too_far {
            // Rejected: cursor and stats stay untouched so one stray query
            // cannot derail subsequent sequential lookups.
            return None;
        }

        self.last_index = index;
        self.last_timestamp = actual;

        let stats = self.stats.for_strategy_mut(strategy);
        stats.calls += 1;
        stats.total_time += started.elapsed();

        table.point_at(index)
    }

    /// Closest index by binary search; assumes sorted timestamps and
    /// `row_count >= 2`.
    fn binary_search_closest(&self, timestamps: &[f64], target: f64) -> usize {
        let mut left: isize = 0;
        let mut right: isize = self.row_count as isize - 1;

        if target <= timestamps[left as usize] {
            return left as usize;
        }
        if target >= timestamps[right as usize] {
            return right as usize;
        }

        while left <= right {
            let mid = ((left + right) / 2) as usize;
            let mid_ts = timestamps[mid];
            if mid_ts == target {
                return mid;
            }
            if mid_ts < target {
                left = mid as isize + 1;
            } else {
                right = mid as isize - 1;
            }
        }

        // left and right now bracket the target; pick the closer side.
        let left_diff = (timestamps[left as usize] - target).abs();
        let right_diff = (timestamps[right as usize] - target).abs();
        if left_diff < right_diff {
            left as usize
        } else {
            right as usize
        }
    }

    /// True when the table was unsorted at construction; every lookup misses.
    pub fn is_degraded(&self) -> bool {
        !self.is_sorted
    }

    pub fn is_evenly_spaced(&self) -> bool {
        self.is_evenly_spaced
    }

    pub fn average_step(&self) -> f64 {
        self.average_step
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn stats(&self) -> &LookupStats {
        &self.stats
    }
}

fn check_sorted(timestamps: &[f64]) -> bool {
    timestamps.windows(2).all(|pair| pair[0] <= pair[1])
}

/// Compare every step against the first step; a deviation beyond `tolerance`
/// means the spacing cannot be trusted for cursor/interpolation shortcuts.
fn check_even_spacing(timestamps: &[f64], average_step: f64, tolerance: f64) -> bool {
    if timestamps.len() < 3 || average_step == 0.0 {
        return true;
    }
    let first_step = timestamps[1] - timestamps[0];
    timestamps
        .windows(2)
        .skip(1)
        .all(|pair| ((pair[1] - pair[0]) - first_step).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::SampleValue;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn table_from(timestamps: &[f64]) -> Arc<RwLock<TimeseriesTable>> {
        let points: Vec<TimeseriesPoint> = timestamps
            .iter()
            .enumerate()
            .map(|(i, &ts)| {
                TimeseriesPoint::new(ts).with_value("a", SampleValue::Scalar((i + 1) as f64))
            })
            .collect();
        let mut table = TimeseriesTable::new();
        table.extend(&points);
        Arc::new(RwLock::new(table))
    }

    fn scalar_a(point: &TimeseriesPoint) -> f64 {
        match point.values.get("a") {
            Some(SampleValue::Scalar(value)) => *value,
            other => panic!("missing scalar a: {other:?}"),
        }
    }

    #[test]
    fn empty_table_returns_none() {
        let mut index = TimestampIndex::new(table_from(&[]));
        assert_eq!(index.lookup(1500.0), None);
    }

    #[test]
    fn single_row_table_returns_that_row() {
        let mut index = TimestampIndex::new(table_from(&[1000.0]));
        assert_eq!(index.lookup(500.0).map(|p| p.timestamp), Some(1000.0));
        assert_eq!(index.lookup(1500.0).map(|p| p.timestamp), Some(1000.0));
    }

    #[test]
    fn forward_replay_walks_the_cursor() {
        let mut index = TimestampIndex::new(table_from(&[1000.0, 2000.0, 3000.0, 4000.0, 5000.0]));

        // Equidistant between 1000 and 2000: the first-scanned (lower) index
        // wins the tie.
        let first = index.lookup(1500.0).expect("within range");
        assert_eq!(first.timestamp, 1000.0);
        assert_eq!(scalar_a(&first), 1.0);

        let second = index.lookup(2500.0).expect("within range");
        assert_eq!(second.timestamp, 2000.0);

        let exact = index.lookup(3000.0).expect("exact");
        assert_eq!(exact.timestamp, 3000.0);
        assert_eq!(scalar_a(&exact), 3.0);

        assert_eq!(index.stats().forward.calls, 3);
        assert_eq!(index.stats().binary.calls, 0);
    }

    #[test]
    fn reverse_scrub_walks_the_cursor_back() {
        let mut index = TimestampIndex::new(table_from(&[1000.0, 2000.0, 3000.0, 4000.0, 5000.0]));

        let forward = index.lookup(3500.0).expect("forward first");
        assert_eq!(forward.timestamp, 3000.0);

        // Below the cursor, within the scan window: the reverse branch holds
        // position while the previous row is still past the target.
        let reverse = index.lookup(2800.0).expect("reverse");
        assert_eq!(reverse.timestamp, 3000.0);
        assert_eq!(index.stats().reverse.calls, 1);

        let exact = index.lookup(2000.0).expect("reverse exact");
        assert_eq!(exact.timestamp, 2000.0);
        assert_eq!(index.stats().reverse.calls, 2);
    }

    #[test]
    fn interpolation_covers_jumps_beyond_the_scan_window() {
        let mut index = TimestampIndex::new(table_from(&[1000.0, 2000.0, 3000.0, 4000.0, 5000.0]));

        // 5000 is 4 steps past the fresh cursor, outside the 3-step window.
        let jumped = index.lookup(5000.0).expect("in range");
        assert_eq!(jumped.timestamp, 5000.0);
        assert_eq!(index.stats().interpolate.calls, 1);
        assert_eq!(index.stats().binary.calls, 0);
    }

    #[test]
    fn proximity_gate_rejects_far_targets_and_preserves_the_cursor() {
        let mut index = TimestampIndex::new(table_from(&[1000.0, 2000.0, 3000.0, 4000.0, 5000.0]));

        // Nearest row is 5000 but |8000 - 5000| exceeds 1.5x the average
        // step, so the result is rejected rather than approximated.
        assert_eq!(index.lookup(8000.0), None);

        // The rejection must not have moved the cursor: a sequential query
        // close to the start still resolves through forward replay.
        let next = index.lookup(1500.0).expect("cursor intact");
        assert_eq!(next.timestamp, 1000.0);
        assert_eq!(index.stats().forward.calls, 1);
    }

    #[test]
    fn unsorted_table_degrades_permanently() {
        let mut index = TimestampIndex::new(table_from(&[3000.0, 1000.0, 2000.0]));
        assert!(index.is_degraded());
        assert_eq!(index.lookup(1000.0), None);
        assert_eq!(index.lookup(2000.0), None);
        assert_eq!(index.lookup(2500.0), None);
    }

    #[test]
    fn uneven_spacing_always_uses_binary_search() {
        let mut index = TimestampIndex::new(table_from(&[0.0, 100.0, 250.0, 300.0, 1000.0]));
        assert!(!index.is_evenly_spaced());

        let found = index.lookup(240.0).expect("within gate");
        assert_eq!(found.timestamp, 250.0);
        assert_eq!(index.stats().binary.calls, 1);
        assert_eq!(index.stats().forward.calls, 0);
    }

    #[test]
    fn sequential_lookups_never_fall_back_to_binary_search() {
        let timestamps: Vec<f64> = (0..500).map(|i| 1000.0 + i as f64 * 10.0).collect();
        let mut index = TimestampIndex::new(table_from(&timestamps));

        let mut target = 1000.0;
        while target <= 5990.0 {
            assert!(index.lookup(target).is_some());
            target += 5.0;
        }

        assert_eq!(index.stats().binary.calls, 0);
        assert_eq!(index.stats().interpolate.calls, 0);
        assert!(index.stats().forward.calls > 0);
    }

    #[test]
    fn lookup_results_respect_the_proximity_bound() {
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..20 {
            let len = rng.gen_range(2..100);
            let mut timestamps: Vec<f64> =
                (0..len).map(|_| rng.gen_range(0.0..5_000.0)).collect();
            timestamps.sort_by(|a, b| a.partial_cmp(b).expect("finite"));

            let mut index = TimestampIndex::new(table_from(&timestamps));
            let bound = 1.5 * index.average_step();

            for _ in 0..50 {
                let target = rng.gen_range(-500.0..5_500.0);
                if let Some(point) = index.lookup(target) {
                    assert!(
                        (point.timestamp - target).abs() <= bound,
                        "result {} too far from target {target}",
                        point.timestamp
                    );
                }
            }
        }
    }

    #[test]
    fn binary_search_agrees_with_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let len = rng.gen_range(2..200);
            let mut timestamps: Vec<f64> =
                (0..len).map(|_| rng.gen_range(0.0..10_000.0)).collect();
            timestamps.sort_by(|a, b| a.partial_cmp(b).expect("finite"));

            let table = table_from(&timestamps);
            let index = TimestampIndex::new(table.clone());
            let guard = table.read();

            for _ in 0..20 {
                let target = rng.gen_range(-1000.0..11_000.0);
                let found = index.binary_search_closest(guard.timestamps(), target);

                let mut best = 0;
                let mut best_diff = (timestamps[0] - target).abs();
                for (i, &ts) in timestamps.iter().enumerate().skip(1) {
                    let diff = (ts - target).abs();
                    if diff < best_diff {
                        best_diff = diff;
                        best = i;
                    }
                }

                assert_eq!(
                    (timestamps[found] - target).abs(),
                    (timestamps[best] - target).abs(),
                    "binary {found} vs brute {best} for target {target}"
                );
            }
        }
    }
}
