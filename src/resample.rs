//! Repairing and down-sampling per-antenna telemetry series.
//!
//! All series here are `[time, column]`, with one column per antenna (or per
//! band, for DCM offsets). Binning averages `dt` consecutive rows into one,
//! dropping any partial bin at the end.

use itertools::Itertools;
use ndarray::{s, Array2, ArrayView2};

use crate::{constants::NUM_FEM_LEVELS, time::Instant, util::nearest_val_idx};

/// Which samples of a `[time, ant]` series to overwrite with which, so that
/// each dead sample takes the value of the same antenna's nearest-in-time live
/// sample. Ties go to the earlier sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairPlan {
    /// `(ant, dead_row, live_row)`
    moves: Vec<(usize, usize, usize)>,
    dead_antennas: Vec<usize>,
}

impl RepairPlan {
    /// Plan repairs from each row's timestamp and a `[time, ant]` liveness
    /// mask.
    pub fn new(timestamps: &[Instant], live: ArrayView2<bool>) -> Self {
        let mut plan = Self::default();
        for (ant, lane) in live.columns().into_iter().enumerate() {
            let (good, bad): (Vec<usize>, Vec<usize>) = (0..lane.len()).partition(|&t| lane[t]);
            if bad.is_empty() {
                continue;
            }
            if good.is_empty() {
                plan.dead_antennas.push(ant);
                continue;
            }
            let tick = |t: &usize| timestamps[*t].ticks() as f64;
            let good_ticks = good.iter().map(tick).collect_vec();
            let bad_ticks = bad.iter().map(tick).collect_vec();
            for (dead_row, nearest) in bad.iter().zip(nearest_val_idx(&bad_ticks, &good_ticks)) {
                plan.moves.push((ant, *dead_row, good[nearest]));
            }
        }
        plan
    }

    /// Antennas with no live sample at all, which are left unrepaired.
    pub fn dead_antennas(&self) -> &[usize] {
        &self.dead_antennas
    }

    /// Whether the plan changes anything.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Apply the plan to a `[time, ant]` series.
    pub fn apply<T: Copy>(&self, series: &mut Array2<T>) {
        for &(ant, dead_row, live_row) in &self.moves {
            series[[dead_row, ant]] = series[[live_row, ant]];
        }
    }
}

/// Number of whole bins of `dt` rows in `num_rows` rows.
pub const fn num_bins(num_rows: usize, dt: usize) -> usize {
    num_rows / dt
}

/// The timestamp of the middle row of each bin.
pub fn bin_centre_times(timestamps: &[Instant], dt: usize) -> Vec<Instant> {
    (0..num_bins(timestamps.len(), dt))
        .map(|bin| timestamps[bin * dt + dt / 2])
        .collect()
}

/// Mean of each bin of `dt` rows, `[bin, column]`.
pub fn bin_means(series: ArrayView2<f64>, dt: usize) -> Array2<f64> {
    let (num_rows, num_cols) = series.dim();
    let nbins = num_bins(num_rows, dt);
    Array2::from_shape_fn((nbins, num_cols), |(bin, col)| {
        series
            .slice(s![bin * dt..(bin + 1) * dt, col])
            .mean()
            .unwrap_or(f64::NAN)
    })
}

/// Fraction of time spent at each discrete attenuation level.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelOccupancy([f64; NUM_FEM_LEVELS]);

impl LevelOccupancy {
    /// The occupancy of a sequence of level readings. Levels outside
    /// `0..NUM_FEM_LEVELS` are not counted but still dilute the others.
    pub fn from_levels(levels: impl IntoIterator<Item = u8>) -> Self {
        let mut counts = [0usize; NUM_FEM_LEVELS];
        let mut total = 0usize;
        for level in levels {
            total += 1;
            if let Some(count) = counts.get_mut(level as usize) {
                *count += 1;
            }
        }
        let mut fractions = [0.0; NUM_FEM_LEVELS];
        if total > 0 {
            for (fraction, count) in fractions.iter_mut().zip(counts) {
                *fraction = count as f64 / total as f64;
            }
        }
        Self(fractions)
    }

    /// Fraction of time spent at `level`.
    pub fn fraction(&self, level: usize) -> f64 {
        self.0.get(level).copied().unwrap_or(0.0)
    }

    /// `(level, fraction)` for every level that was occupied.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &fraction)| fraction > 0.0)
            .map(|(level, &fraction)| (level, fraction))
    }

    /// Sum of all fractions.
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// Level occupancy of each bin of `dt` rows, `[bin, column]`.
pub fn bin_occupancy(series: ArrayView2<u8>, dt: usize) -> Array2<LevelOccupancy> {
    let (num_rows, num_cols) = series.dim();
    let nbins = num_bins(num_rows, dt);
    Array2::from_shape_fn((nbins, num_cols), |(bin, col)| {
        LevelOccupancy::from_levels(series.slice(s![bin * dt..(bin + 1) * dt, col]).iter().copied())
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    fn ticks(n: i64) -> Vec<Instant> {
        (0..n).map(Instant::from_ticks).collect()
    }

    #[test]
    fn test_repair_takes_nearest_live_sample() {
        let live = array![[true, false], [false, false], [false, false], [true, false]];
        let mut series = array![[1, 9], [0, 9], [0, 9], [4, 9]];
        let plan = RepairPlan::new(&ticks(4), live.view());
        plan.apply(&mut series);
        // row 1 is nearer row 0, row 2 is nearer row 3
        assert_eq!(series.column(0).to_vec(), vec![1, 1, 4, 4]);
        // an antenna with no live samples is untouched
        assert_eq!(series.column(1).to_vec(), vec![9, 9, 9, 9]);
        assert_eq!(plan.dead_antennas(), &[1]);
    }

    #[test]
    fn test_repair_tie_goes_earlier() {
        let live = array![[true], [false], [true]];
        let mut series = array![[1.0], [0.0], [3.0]];
        RepairPlan::new(&ticks(3), live.view()).apply(&mut series);
        assert_eq!(series[[1, 0]], 1.0);
    }

    #[test]
    fn test_repair_uses_timestamps_not_rows() {
        let times = [0, 1, 100].map(Instant::from_ticks);
        let live = array![[true], [false], [true]];
        let mut series = array![[1.0], [0.0], [3.0]];
        RepairPlan::new(&times, live.view()).apply(&mut series);
        assert_eq!(series[[1, 0]], 1.0);
    }

    #[test]
    fn test_bin_of_one_is_identity() {
        let series = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        assert_eq!(bin_means(series.view(), 1), series);
        assert_eq!(bin_centre_times(&ticks(3), 1), ticks(3));
    }

    #[test]
    fn test_bin_means_drop_partial_bin() {
        let series = array![[1.0], [3.0], [5.0], [7.0], [100.0]];
        let binned = bin_means(series.view(), 2);
        assert_eq!(binned, array![[2.0], [6.0]]);
        let times = bin_centre_times(&ticks(5), 2);
        assert_eq!(times, vec![Instant::from_ticks(1), Instant::from_ticks(3)]);
    }

    #[test]
    fn test_occupancy_sums_to_one() {
        let series = array![[3u8], [3], [4], [15], [0], [0]];
        let occupancy = bin_occupancy(series.view(), 3);
        assert_eq!(occupancy.dim(), (2, 1));
        for occ in occupancy.iter() {
            assert_abs_diff_eq!(occ.total(), 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(occupancy[[0, 0]].fraction(3), 2.0 / 3.0);
        assert_abs_diff_eq!(occupancy[[1, 0]].fraction(15), 1.0 / 3.0);
        assert_eq!(occupancy[[1, 0]].occupied().count(), 2);
    }
}
