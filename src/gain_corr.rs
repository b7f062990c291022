//! Correcting correlator data for changes in attenuator settings since a
//! reference epoch.

use log::{error, trace, warn};
use ndarray::{s, Array4};

use crate::{
    context::GainCalContext,
    corrections::{apply_antenna_gains, db_to_power, time_index},
    error::IncompatibleStateError,
    gain_state::{get_gain_state, GainState},
    reference::{
        reference_at, resolve_reference, ReferenceEpoch, ReferenceStrategy,
        APPLY_GAIN_CORR_STRATEGIES, GET_GAIN_CORR_STRATEGIES,
    },
    time::{Instant, TimeRange},
    types::CorrelatorData,
    util::freq_to_band_idx,
};

/// Per-antenna gains relative to a reference, per band.
#[derive(Debug, Clone, PartialEq)]
pub struct AntennaGainTable {
    /// Timestamp of each sample
    pub times: Vec<Instant>,
    /// Gain (dB), `[ant, pol, band, time]`
    pub gain_db: Array4<f64>,
}

impl AntennaGainTable {
    /// A table of zero dB gains with the shape of `state`.
    pub fn unity(state: &GainState) -> Self {
        let (num_ants, num_pols, num_times) = state.first.dim();
        Self {
            times: state.times.clone(),
            gain_db: Array4::zeros((num_ants, num_pols, state.num_bands(), num_times)),
        }
    }

    /// Number of bands.
    pub fn num_bands(&self) -> usize {
        self.gain_db.dim().2
    }

    /// Linear power gains per channel, `[ant, pol, chan, time]`. Each channel
    /// takes the gain of the band its frequency falls in. Channels outside
    /// every band are unity.
    pub fn power_gain_by_channel(&self, fghz: &[f64]) -> Array4<f64> {
        let (num_ants, num_pols, num_bands, num_times) = self.gain_db.dim();
        let band_gain = db_to_power(&self.gain_db);
        let mut gain = Array4::ones((num_ants, num_pols, fghz.len(), num_times));
        let mut outside = 0;
        for (chan, &f) in fghz.iter().enumerate() {
            match freq_to_band_idx(f).filter(|&band| band < num_bands) {
                Some(band) => gain
                    .slice_mut(s![.., .., chan, ..])
                    .assign(&band_gain.slice(s![.., .., band, ..])),
                None => outside += 1,
            }
        }
        if outside > 0 {
            warn!(
                "{} of {} channels lie outside the {} known bands and are not gain corrected",
                outside,
                fghz.len(),
                num_bands
            );
        }
        gain
    }
}

/// The gain of `source` relative to `reference`, in dB per antenna,
/// polarization, band and source time:
///
/// `(first + second)_source - (first + second)_reference + dcm_source - dcm_reference`
///
/// A reference with more than one sample is reduced to its median first.
///
/// # Errors
///
/// [`IncompatibleStateError`] if the states have different numbers of bands.
pub fn gain_difference(
    source: &GainState,
    reference: &GainState,
) -> Result<AntennaGainTable, IncompatibleStateError> {
    if source.num_bands() != reference.num_bands() {
        return Err(IncompatibleStateError {
            source_bands: source.num_bands(),
            reference_bands: reference.num_bands(),
        });
    }
    let median;
    let reference = if reference.num_times() == 1 {
        reference
    } else {
        median = reference.median_over_time();
        &median
    };
    let src_fem = source.fem_attn();
    let ref_fem = reference.fem_attn();
    let dcm = &source.dcm.attn - &reference.dcm.attn;
    let (num_ants, num_pols, num_times) = src_fem.dim();
    let gain_db = Array4::from_shape_fn(
        (num_ants, num_pols, source.num_bands(), num_times),
        |(ant, pol, band, t)| src_fem[[ant, pol, t]] - ref_fem[[ant, pol, 0]] + dcm[[ant, pol, band]],
    );
    Ok(AntennaGainTable {
        times: source.times.clone(),
        gain_db,
    })
}

/// As [`gain_difference`], but an incompatible reference gives a unity table
/// with a warning.
pub fn gain_difference_or_unity(source: &GainState, reference: &GainState) -> AntennaGainTable {
    gain_difference(source, reference).unwrap_or_else(|e| {
        warn!("{}. No gain correction applied!", e);
        AntennaGainTable::unity(source)
    })
}

/// The per-antenna gain table over `trange`, relative to the reference at
/// `tref`, or to one found through the calibration header if not given.
///
/// Returns `None`, after logging why, if no reference or source state can be
/// read.
pub fn get_gain_corr(
    ctx: &GainCalContext,
    trange: TimeRange,
    tref: Option<Instant>,
) -> Option<AntennaGainTable> {
    trace!("start get_gain_corr");
    let reference = find_reference(ctx, trange, tref, &GET_GAIN_CORR_STRATEGIES)?;
    let source = get_gain_state(ctx, trange, None, false)?;
    let table = gain_difference_or_unity(&source, &reference.state);
    trace!("end get_gain_corr");
    Some(table)
}

fn find_reference(
    ctx: &GainCalContext,
    trange: TimeRange,
    tref: Option<Instant>,
    strategies: &[ReferenceStrategy],
) -> Option<ReferenceEpoch> {
    let reference = match tref {
        Some(tref) => reference_at(ctx, tref),
        None => resolve_reference(ctx, trange.start, strategies),
    };
    reference
        .map_err(|e| error!("no reference gain state for {}: {}", trange, e))
        .ok()
}

/// Correct `data` for attenuator changes since the reference at `tref`, or
/// since one found automatically if not given.
///
/// Always returns a record. If anything needed for the correction is
/// unavailable, the reason is logged and an unchanged copy returned.
pub fn apply_gain_corr(
    ctx: &GainCalContext,
    data: &CorrelatorData,
    tref: Option<Instant>,
) -> CorrelatorData {
    trace!("start apply_gain_corr");
    let mut corrected = data.clone();
    if let Err(e) = data.validate() {
        error!("{}. No gain correction applied!", e);
        return corrected;
    }
    let Some(trange) = data.time_range() else {
        warn!("data has no integrations. No gain correction applied!");
        return corrected;
    };
    let Some(reference) = find_reference(ctx, trange, tref, &APPLY_GAIN_CORR_STRATEGIES) else {
        return corrected;
    };
    let Some(source) = get_gain_state(ctx, trange, data.cadence(), false) else {
        return corrected;
    };

    let table = gain_difference_or_unity(&source, &reference.state);
    let gain = table.power_gain_by_channel(&data.fghz);
    let time_idx = time_index(&data.time, &table.times);
    if let Err(e) = apply_antenna_gains(&mut corrected, gain.view(), &time_idx) {
        error!("{}. No gain correction applied!", e);
        return data.clone();
    }
    trace!("end apply_gain_corr");
    corrected
}
