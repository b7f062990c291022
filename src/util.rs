//! Utility functions

use crate::constants::FREQ_MATCH_DECIMALS;

/// For each target, the index of the nearest value in `values`, which must be
/// sorted in increasing order. Ties go to the earlier (lower) value.
///
/// Returns an empty vector if `values` is empty.
///
/// # Examples
///
/// ```rust
/// use gaincal::util::nearest_val_idx;
///
/// let idx = nearest_val_idx(&[0.0, 1.5, 2.6, 9.0], &[1.0, 2.0, 3.0]);
/// assert_eq!(idx, vec![0, 0, 2, 2]);
/// ```
pub fn nearest_val_idx(targets: &[f64], values: &[f64]) -> Vec<usize> {
    if values.is_empty() {
        return vec![];
    }
    targets
        .iter()
        .map(|&target| {
            let upper = values.partition_point(|&v| v < target);
            if upper == 0 {
                0
            } else if upper == values.len() {
                values.len() - 1
            } else if target - values[upper - 1] <= values[upper] - target {
                upper - 1
            } else {
                upper
            }
        })
        .collect()
}

/// Pairs of indices `(i, j)` such that `a[i]` and `b[j]` are equal once
/// rounded to [`FREQ_MATCH_DECIMALS`] decimal places, in order of `a`.
pub fn common_val_idx(a: &[f64], b: &[f64]) -> Vec<(usize, usize)> {
    let scale = 10f64.powi(FREQ_MATCH_DECIMALS);
    let key = |v: f64| (v * scale).round() as i64;
    let b_keys: Vec<i64> = b.iter().map(|&v| key(v)).collect();
    a.iter()
        .enumerate()
        .filter_map(|(i, &v)| {
            let k = key(v);
            b_keys.iter().position(|&bk| bk == k).map(|j| (i, j))
        })
        .collect()
}

/// The median of a slice, averaging the middle pair for even lengths. NaN for
/// an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// 0-based band index of a frequency in GHz, or `None` below the first band.
///
/// Band `n` (1-based) covers `[(n + 1) / 2, (n + 2) / 2)` GHz.
pub fn freq_to_band_idx(fghz: f64) -> Option<usize> {
    let band = (2.0 * fghz - 1.0).floor() as i64;
    if band >= 1 {
        Some((band - 1) as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_ties_go_earlier() {
        assert_eq!(nearest_val_idx(&[1.5, 2.5], &[1.0, 2.0, 3.0]), vec![0, 1]);
        assert_eq!(nearest_val_idx(&[1.6], &[1.0, 2.0, 3.0]), vec![1]);
        assert!(nearest_val_idx(&[1.0], &[]).is_empty());
    }

    #[test]
    fn test_common_val_idx_rounds() {
        let a = [1.00001, 1.5, 2.0, 7.0];
        let b = [2.00004, 1.0, 3.0];
        assert_eq!(common_val_idx(&a, &b), vec![(0, 1), (2, 0)]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_freq_to_band() {
        assert_eq!(freq_to_band_idx(1.1), Some(0));
        assert_eq!(freq_to_band_idx(1.6), Some(1));
        assert_eq!(freq_to_band_idx(17.9), Some(33));
        assert_eq!(freq_to_band_idx(0.9), None);
    }
}
