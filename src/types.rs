//! Correlator data records and the background estimates applied to them.

use ndarray::{Array3, Array4};
use num_complex::Complex;

use crate::{
    constants::{
        NUM_AUTO_POL_PRODUCTS, NUM_BASELINES, NUM_CORR_ANTS, NUM_CROSS_POL_PRODUCTS, NUM_POLS,
    },
    error::BadArrayShape,
    time::{cadence_secs, TimeRange},
};

/// One record of correlator output.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatorData {
    /// Julian date of each integration
    pub time: Vec<f64>,
    /// Centre frequency of each channel (GHz)
    pub fghz: Vec<f64>,
    /// Cross-correlations, `[baseline, product, chan, time]` with products
    /// HH, VV, HV, VH
    pub x: Array4<Complex<f32>>,
    /// Autocorrelations, `[ant, product, chan, time]` with products aa, bb,
    /// ab, ba
    pub a: Array4<Complex<f32>>,
    /// Total power, `[ant, pol, chan, time]`
    pub p: Array4<f32>,
    /// Total power squared, `[ant, pol, chan, time]`
    pub p2: Array4<f32>,
}

impl CorrelatorData {
    /// A record over `time` and `fghz` with every product set to one.
    pub fn ones(time: Vec<f64>, fghz: Vec<f64>) -> Self {
        let (nf, nt) = (fghz.len(), time.len());
        let one = Complex::new(1.0, 0.0);
        Self {
            x: Array4::from_elem((NUM_BASELINES, NUM_CROSS_POL_PRODUCTS, nf, nt), one),
            a: Array4::from_elem((NUM_CORR_ANTS, NUM_AUTO_POL_PRODUCTS, nf, nt), one),
            p: Array4::ones((NUM_CORR_ANTS, NUM_POLS, nf, nt)),
            p2: Array4::ones((NUM_CORR_ANTS, NUM_POLS, nf, nt)),
            time,
            fghz,
        }
    }

    /// Number of integrations.
    pub fn num_times(&self) -> usize {
        self.time.len()
    }

    /// Number of channels.
    pub fn num_chans(&self) -> usize {
        self.fghz.len()
    }

    /// The range from the first to the last integration.
    pub fn time_range(&self) -> Option<TimeRange> {
        TimeRange::from_jd_times(&self.time)
    }

    /// Integration cadence in whole seconds, `None` at native cadence.
    pub fn cadence(&self) -> Option<usize> {
        cadence_secs(&self.time)
    }

    /// Check that every tensor agrees with the time and frequency axes.
    ///
    /// # Errors
    ///
    /// [`BadArrayShape`] naming the first tensor that does not.
    pub fn validate(&self) -> Result<(), BadArrayShape> {
        let (nf, nt) = (self.num_chans(), self.num_times());
        let check = |argument: &'static str, received: (usize, usize, usize, usize), expected| {
            if received == expected {
                Ok(())
            } else {
                Err(BadArrayShape {
                    argument,
                    function: "CorrelatorData::validate",
                    expected: format!("{expected:?}"),
                    received: format!("{received:?}"),
                })
            }
        };
        check("x", self.x.dim(), (NUM_BASELINES, NUM_CROSS_POL_PRODUCTS, nf, nt))?;
        check("a", self.a.dim(), (NUM_CORR_ANTS, NUM_AUTO_POL_PRODUCTS, nf, nt))?;
        check("p", self.p.dim(), (NUM_CORR_ANTS, NUM_POLS, nf, nt))?;
        check("p2", self.p2.dim(), (NUM_CORR_ANTS, NUM_POLS, nf, nt))
    }
}

/// Receiver background estimated from a sky calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyCal {
    /// Background in total power, `[ant, pol, chan]`
    pub rcvr_bgd: Array3<f32>,
    /// Background in the parallel-hand autocorrelations, `[ant, pol, chan]`
    pub rcvr_bgd_auto: Array3<f32>,
}
