//! Applying per-antenna gain tables to correlator data.
//!
//! Both the gain corrector and the level corrector reduce their work to a
//! table of linear power gains per antenna, polarization, channel and time
//! sample. This module turns such a table into baseline gains and multiplies
//! it into every correlator product.

use itertools::izip;
use lazy_static::lazy_static;
use log::trace;
use ndarray::{s, Array2, Array3, Array4, ArrayView4, Axis, Zip};
use rayon::prelude::*;

use crate::{
    constants::{NUM_BASELINES, NUM_CORR_ANTS, NUM_CROSS_POL_PRODUCTS, NUM_POLS},
    error::BadArrayShape,
    time::Instant,
    types::CorrelatorData,
    util::nearest_val_idx,
};

lazy_static! {
    /// Baseline index of each pair of correlator inputs, or `None` for an
    /// input with itself. Baselines run over the upper triangle in row-major
    /// order: (0, 1), (0, 2), ..., (0, 15), (1, 2), ...
    static ref BL2ORD: Array2<Option<usize>> = {
        let mut table = Array2::from_elem((NUM_CORR_ANTS, NUM_CORR_ANTS), None);
        let mut bl = 0;
        for i in 0..NUM_CORR_ANTS {
            for j in i + 1..NUM_CORR_ANTS {
                table[[i, j]] = Some(bl);
                table[[j, i]] = Some(bl);
                bl += 1;
            }
        }
        table
    };
}

/// The baseline index of a pair of correlator inputs, in either order.
pub fn bl2ord(ant1: usize, ant2: usize) -> Option<usize> {
    BL2ORD.get([ant1, ant2]).copied().flatten()
}

/// For each data timestamp (JD), the index of the nearest gain table time.
pub fn time_index(data_jd: &[f64], table_times: &[Instant]) -> Vec<usize> {
    let table_jd: Vec<f64> = table_times.iter().map(|t| t.to_jd()).collect();
    nearest_val_idx(data_jd, &table_jd)
}

/// Baseline amplitude gains from antenna power gains.
///
/// `ant_gain` is `[ant, pol, chan, time]`. The result is
/// `[NUM_BASELINES, NUM_CROSS_POL_PRODUCTS, chan, time]`, with products HH,
/// VV, HV, VH. The gain of product `pq` on baseline `(i, j)` is
/// `sqrt(g[i, p] * g[j, q])`. Baselines involving an antenna past the end of
/// `ant_gain` are unity.
pub fn baseline_gains(ant_gain: ArrayView4<f64>) -> Array4<f64> {
    let (num_ants, _, num_chans, num_times) = ant_gain.dim();
    let mut bl_gain = Array4::ones((NUM_BASELINES, NUM_CROSS_POL_PRODUCTS, num_chans, num_times));
    let products = [(0, 0), (1, 1), (0, 1), (1, 0)];
    for i in 0..num_ants.min(NUM_CORR_ANTS) {
        for j in i + 1..num_ants.min(NUM_CORR_ANTS) {
            let Some(bl) = bl2ord(i, j) else { continue };
            for (mut product, &(p, q)) in izip!(
                bl_gain.index_axis_mut(Axis(0), bl).outer_iter_mut(),
                products.iter()
            ) {
                Zip::from(&mut product)
                    .and(ant_gain.slice(s![i, p, .., ..]))
                    .and(ant_gain.slice(s![j, q, .., ..]))
                    .for_each(|g, &gi, &gj| *g = (gi * gj).sqrt());
            }
        }
    }
    bl_gain
}

/// Multiply antenna power gains into correlator data.
///
/// `ant_gain` is `[ant, pol, chan, time]` and `time_idx` gives, for each data
/// timestamp, the table time to use. Cross-correlations take baseline
/// amplitude gains, total power and the parallel-hand autocorrelations take
/// the power gain, the cross-hand autocorrelations take the geometric mean of
/// the two polarizations' gains, and power-squared takes the squared gain.
/// Antennas past the end of `ant_gain` are untouched.
///
/// # Errors
///
/// [`BadArrayShape`] if the data is inconsistent, or the table does not match
/// it. Nothing is modified in that case.
pub fn apply_antenna_gains(
    data: &mut CorrelatorData,
    ant_gain: ArrayView4<f64>,
    time_idx: &[usize],
) -> Result<(), BadArrayShape> {
    trace!("start apply_antenna_gains");
    data.validate()?;
    let (num_ants, num_pols, num_chans, num_table_times) = ant_gain.dim();
    if num_ants > NUM_CORR_ANTS || num_pols != NUM_POLS || num_chans != data.num_chans() {
        return Err(BadArrayShape {
            argument: "ant_gain",
            function: "apply_antenna_gains",
            expected: format!("(<={}, {}, {}, ntimes)", NUM_CORR_ANTS, NUM_POLS, data.num_chans()),
            received: format!("{:?}", ant_gain.dim()),
        });
    }
    if time_idx.len() != data.num_times() || time_idx.iter().any(|&t| t >= num_table_times) {
        return Err(BadArrayShape {
            argument: "time_idx",
            function: "apply_antenna_gains",
            expected: format!("{} indices below {}", data.num_times(), num_table_times),
            received: format!("{} indices", time_idx.len()),
        });
    }

    // gains on the data's own time axis
    let gain = ant_gain.select(Axis(3), time_idx);
    let bl_gain = baseline_gains(gain.view());
    let cross_fac: Array3<f64> = Zip::from(gain.index_axis(Axis(1), 0))
        .and(gain.index_axis(Axis(1), 1))
        .map_collect(|&g0, &g1| (g0 * g1).sqrt());

    Zip::from(&mut data.x)
        .and(&bl_gain)
        .par_for_each(|x, &g| *x *= g as f32);

    Zip::from(data.p.slice_mut(s![..num_ants, .., .., ..]))
        .and(&gain)
        .par_for_each(|p, &g| *p *= g as f32);
    Zip::from(data.p2.slice_mut(s![..num_ants, .., .., ..]))
        .and(&gain)
        .par_for_each(|p2, &g| *p2 *= (g * g) as f32);
    Zip::from(data.a.slice_mut(s![..num_ants, ..NUM_POLS, .., ..]))
        .and(&gain)
        .par_for_each(|a, &g| *a *= g as f32);
    data.a
        .slice_mut(s![..num_ants, NUM_POLS.., .., ..])
        .axis_iter_mut(Axis(1))
        .into_par_iter()
        .for_each(|mut product| {
            Zip::from(&mut product)
                .and(&cross_fac)
                .for_each(|a, &g| *a *= g as f32);
        });

    trace!("end apply_antenna_gains");
    Ok(())
}

/// Convert gains in dB to linear power gains.
pub fn db_to_power(gain_db: &Array4<f64>) -> Array4<f64> {
    gain_db.mapv(|g| 10f64.powf(g / 10.0))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::Array4;
    use num_complex::Complex;

    use super::*;
    use crate::{constants::NUM_ANTS, test_common::correlator_data};

    #[test]
    fn test_bl2ord() {
        assert_eq!(bl2ord(0, 1), Some(0));
        assert_eq!(bl2ord(1, 0), Some(0));
        assert_eq!(bl2ord(0, 15), Some(14));
        assert_eq!(bl2ord(1, 2), Some(15));
        assert_eq!(bl2ord(14, 15), Some(NUM_BASELINES - 1));
        assert_eq!(bl2ord(3, 3), None);
        assert_eq!(bl2ord(0, 16), None);
    }

    #[test]
    fn test_cross_hand_products_use_right_antenna_and_pol() {
        // antenna 0: H 2, V 3; antenna 1: H 5, V 7
        let mut ant_gain = Array4::ones((2, NUM_POLS, 1, 1));
        ant_gain[[0, 0, 0, 0]] = 2.0;
        ant_gain[[0, 1, 0, 0]] = 3.0;
        ant_gain[[1, 0, 0, 0]] = 5.0;
        ant_gain[[1, 1, 0, 0]] = 7.0;
        let bl_gain = baseline_gains(ant_gain.view());
        let bl = bl2ord(0, 1).unwrap();
        assert_abs_diff_eq!(bl_gain[[bl, 0, 0, 0]], 10f64.sqrt());
        assert_abs_diff_eq!(bl_gain[[bl, 1, 0, 0]], 21f64.sqrt());
        // HV is H of the first antenna with V of the second
        assert_abs_diff_eq!(bl_gain[[bl, 2, 0, 0]], 14f64.sqrt());
        assert_abs_diff_eq!(bl_gain[[bl, 3, 0, 0]], 15f64.sqrt());
        // baselines to antennas without gains stay at unity
        assert_eq!(bl_gain[[bl2ord(0, 2).unwrap(), 0, 0, 0]], 1.0);
    }

    #[test]
    fn test_apply_scales_every_product() {
        let mut data = correlator_data(3, &[1.5, 2.5]);
        let mut ant_gain = Array4::ones((NUM_ANTS, NUM_POLS, 2, 1));
        ant_gain.slice_mut(s![4, 0, .., ..]).fill(4.0);
        ant_gain.slice_mut(s![4, 1, .., ..]).fill(9.0);
        apply_antenna_gains(&mut data, ant_gain.view(), &[0, 0, 0]).unwrap();

        let c1 = Complex::new(1.0f32, 0.0);
        assert_eq!(data.p[[4, 0, 1, 2]], 4.0);
        assert_eq!(data.p[[4, 1, 0, 0]], 9.0);
        assert_eq!(data.p2[[4, 1, 0, 0]], 81.0);
        assert_eq!(data.a[[4, 0, 0, 1]], c1 * 4.0);
        assert_eq!(data.a[[4, 2, 0, 1]], c1 * 6.0);
        assert_eq!(data.a[[4, 3, 1, 1]], c1 * 6.0);
        // the reference input is untouched
        assert_eq!(data.p[[15, 0, 0, 0]], 1.0);
        let bl = bl2ord(4, 7).unwrap();
        assert_eq!(data.x[[bl, 0, 0, 0]], c1 * 2.0);
        assert_eq!(data.x[[bl, 3, 0, 0]], c1 * 3.0);
        assert_eq!(data.x[[bl2ord(5, 7).unwrap(), 0, 0, 0]], c1);
    }

    #[test]
    fn test_apply_rejects_bad_table_untouched() {
        let mut data = correlator_data(2, &[1.5]);
        let before = data.clone();
        let ant_gain = Array4::from_elem((NUM_ANTS, NUM_POLS, 3, 1), 2.0);
        assert!(apply_antenna_gains(&mut data, ant_gain.view(), &[0, 0]).is_err());
        let ant_gain = Array4::from_elem((NUM_ANTS, NUM_POLS, 1, 1), 2.0);
        assert!(apply_antenna_gains(&mut data, ant_gain.view(), &[0, 1]).is_err());
        assert_eq!(data, before);
    }

    #[test]
    fn test_time_index() {
        let t0 = Instant::from_ticks(1_000);
        let table = [t0, t0.add_secs(60)];
        let data: Vec<f64> = [0, 29, 31, 90].iter().map(|&s| t0.add_secs(s).to_jd()).collect();
        assert_eq!(time_index(&data, &table), vec![0, 0, 1, 1]);
    }
}
