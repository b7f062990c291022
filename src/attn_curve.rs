//! Front-end attenuation curves: attenuation (dB) inserted at each discrete
//! level, per antenna, polarization and frequency.
//!
//! A GAINCALTEST measures the attenuation of the first few levels. The curve
//! is extended to every level by nominal steps, and matched onto the
//! frequencies of the data being corrected.

use log::{info, trace, warn};
use ndarray::{s, Array4, Axis};

use crate::{
    constants::{FEM_LEVEL_STEP_DB, MAX_FEM_LEVEL_ATTN_DB, NUM_FEM_LEVELS, NUM_POLS},
    error::{BadArrayShape, MissingCalibrationError},
    store::AttnCalStore,
    time::Instant,
    util::common_val_idx,
};

/// Attenuations measured by a GAINCALTEST.
#[derive(Debug, Clone, PartialEq)]
pub struct AttenuationMeasurement {
    /// When the measurement was taken
    pub time: Instant,
    /// Frequencies measured (GHz)
    pub fghz: Vec<f64>,
    /// Attenuation (dB) of levels 1 and up, `[level - 1, ant, pol, freq]`
    pub attn: Array4<f64>,
}

impl AttenuationMeasurement {
    /// Number of levels measured, not counting level 0.
    pub fn num_levels(&self) -> usize {
        self.attn.dim().0
    }

    /// Number of antennas measured.
    pub fn num_ants(&self) -> usize {
        self.attn.dim().1
    }
}

/// Attenuation at every level, on the data's frequency axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AttenuationCurve {
    /// When the underlying measurement was taken
    pub time: Instant,
    /// Attenuation (dB), `[level, ant, pol, chan]`
    pub attn: Array4<f64>,
}

impl AttenuationCurve {
    /// Extend a measurement to all [`NUM_FEM_LEVELS`] levels on the channels
    /// `fghz`.
    ///
    /// Level 0 is 0 dB. Measured levels are copied onto channels whose
    /// frequency matches a measured one. Each level above the last measured
    /// adds [`FEM_LEVEL_STEP_DB`], and the top level is
    /// [`MAX_FEM_LEVEL_ATTN_DB`]. Channels with no matching measurement stay
    /// at 0 dB on every level, so they are left uncorrected.
    ///
    /// # Errors
    ///
    /// [`BadArrayShape`] if the measurement's shape is inconsistent with its
    /// frequencies, or measures too many levels to leave room for the top one.
    pub fn from_measurement(
        measurement: &AttenuationMeasurement,
        fghz: &[f64],
    ) -> Result<Self, BadArrayShape> {
        let (num_measured, num_ants, num_pols, num_freqs) = measurement.attn.dim();
        if num_pols != NUM_POLS
            || num_freqs != measurement.fghz.len()
            || num_measured == 0
            || num_measured >= NUM_FEM_LEVELS - 1
        {
            return Err(BadArrayShape {
                argument: "measurement",
                function: "AttenuationCurve::from_measurement",
                expected: format!(
                    "(1..{}, nants, {}, {})",
                    NUM_FEM_LEVELS - 1,
                    NUM_POLS,
                    measurement.fghz.len()
                ),
                received: format!("{:?}", measurement.attn.dim()),
            });
        }

        let mut attn = Array4::zeros((NUM_FEM_LEVELS, num_ants, NUM_POLS, fghz.len()));
        let matches = common_val_idx(fghz, &measurement.fghz);
        if matches.len() < fghz.len() {
            warn!(
                "{} of {} channels have no measured attenuation and will not be level corrected",
                fghz.len() - matches.len(),
                fghz.len()
            );
        }
        for &(chan, meas_chan) in &matches {
            attn.slice_mut(s![1..=num_measured, .., .., chan])
                .assign(&measurement.attn.slice(s![.., .., .., meas_chan]));
            for level in num_measured + 1..NUM_FEM_LEVELS - 1 {
                let below = attn.slice(s![level - 1, .., .., chan]).to_owned();
                attn.slice_mut(s![level, .., .., chan])
                    .assign(&(below + FEM_LEVEL_STEP_DB));
            }
            attn.slice_mut(s![NUM_FEM_LEVELS - 1, .., .., chan])
                .fill(MAX_FEM_LEVEL_ATTN_DB);
        }
        Ok(Self {
            time: measurement.time,
            attn,
        })
    }

    /// Number of antennas covered.
    pub fn num_ants(&self) -> usize {
        self.attn.len_of(Axis(1))
    }

    /// Linear power gain that undoes `level` on one antenna, polarization and
    /// channel.
    pub fn power_gain(&self, level: usize, ant: usize, pol: usize, chan: usize) -> f64 {
        10f64.powf(self.attn[[level, ant, pol, chan]] / 10.0)
    }
}

/// The attenuation measurement to use on `date`.
///
/// The newest stored measurement is used if it is at most `max_age_days` old.
/// Otherwise the day's scans are measured afresh and the result stored for
/// next time.
///
/// # Errors
///
/// [`MissingCalibrationError`] if nothing usable is stored and nothing can be
/// measured.
pub fn resolve_measurement(
    store: &dyn AttnCalStore,
    date: Instant,
    max_age_days: f64,
) -> Result<AttenuationMeasurement, MissingCalibrationError> {
    trace!("start resolve_measurement");
    match store.read_stored(date) {
        Ok(stored) if date.days_since(stored.time) <= max_age_days => {
            info!("using stored attenuation calibration from {}", stored.time);
            return Ok(stored);
        }
        Ok(stored) => info!(
            "stored attenuation calibration from {} is stale for {}, measuring afresh",
            stored.time, date
        ),
        Err(e) => info!("{}, measuring afresh", e),
    }
    let measured = store
        .measure_from_scans(date)
        .map_err(|e| MissingCalibrationError {
            reason: e.to_string(),
        })?;
    if let Err(e) = store.write(&measured) {
        warn!("could not store attenuation calibration: {}", e);
    }
    trace!("end resolve_measurement");
    Ok(measured)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        constants::NUM_MEASURED_LEVELS,
        store::memory::MemoryAttnStore,
        test_common::{measurement, T0},
    };

    #[test]
    fn test_extrapolation_above_measured_levels() {
        let m = measurement(T0, &[1.5, 2.0], 3);
        let curve = AttenuationCurve::from_measurement(&m, &[2.0, 1.5, 9.9]).unwrap();
        assert_eq!(curve.attn.dim(), (NUM_FEM_LEVELS, 3, NUM_POLS, 3));
        for chan in 0..2 {
            for ant in 0..3 {
                for pol in 0..NUM_POLS {
                    let top = curve.attn[[NUM_MEASURED_LEVELS, ant, pol, chan]];
                    for level in NUM_MEASURED_LEVELS + 1..NUM_FEM_LEVELS - 1 {
                        assert_abs_diff_eq!(
                            curve.attn[[level, ant, pol, chan]],
                            top + 2.0 * (level - NUM_MEASURED_LEVELS) as f64,
                            epsilon = 1e-12
                        );
                    }
                    assert_eq!(curve.attn[[NUM_FEM_LEVELS - 1, ant, pol, chan]], 62.0);
                    assert_eq!(curve.attn[[0, ant, pol, chan]], 0.0);
                }
            }
        }
        // channel 0 is 2.0 GHz, which is measured channel 1
        assert_eq!(curve.attn[[3, 1, 0, 0]], m.attn[[2, 1, 0, 1]]);
        // an unmatched channel is unattenuated at every level
        assert!(curve.attn.slice(s![.., .., .., 2]).iter().all(|&a| a == 0.0));
        assert_abs_diff_eq!(curve.power_gain(15, 0, 0, 0), 10f64.powf(6.2));
    }

    #[test]
    fn test_too_many_levels_rejected() {
        let mut m = measurement(T0, &[1.5], 2);
        m.attn = Array4::zeros((15, 2, NUM_POLS, 1));
        assert!(AttenuationCurve::from_measurement(&m, &[1.5]).is_err());
    }

    #[test]
    fn test_fresh_stored_measurement_is_reused() {
        let stored = measurement(T0, &[1.5], 2);
        let store = MemoryAttnStore::new(vec![stored.clone()], None);
        let resolved = resolve_measurement(&store, T0.add_secs(3600), 1.0).unwrap();
        assert_eq!(resolved, stored);
        assert_eq!(store.stored().len(), 1);
    }

    #[test]
    fn test_stale_measurement_is_replaced_and_persisted() {
        let stale = measurement(T0, &[1.5], 2);
        let fresh = measurement(T0.add_secs(2 * 86_400), &[1.5], 2);
        let store = MemoryAttnStore::new(vec![stale], Some(fresh.clone()));
        let resolved = resolve_measurement(&store, T0.add_secs(2 * 86_400 + 60), 1.0).unwrap();
        assert_eq!(resolved, fresh);
        assert_eq!(store.stored().len(), 2);
    }

    #[test]
    fn test_missing_measurement() {
        let store = MemoryAttnStore::new(vec![], None);
        assert!(resolve_measurement(&store, T0, 1.0).is_err());
    }

    #[test]
    fn test_failed_write_still_resolves() {
        let fresh = measurement(T0, &[1.5], 2);
        let mut store = MemoryAttnStore::new(vec![], Some(fresh.clone()));
        store.set_fail_writes(true);
        assert_eq!(resolve_measurement(&store, T0, 1.0).unwrap(), fresh);
        assert!(store.stored().is_empty());
    }
}
