//! Correcting correlator data for front-end attenuation levels.

use log::{error, info, trace, warn};
use ndarray::{s, Array4, Axis, Zip};

use crate::{
    attn_curve::{resolve_measurement, AttenuationCurve},
    constants::NUM_POLS,
    context::GainCalContext,
    corrections::{apply_antenna_gains, time_index},
    error::BadArrayShape,
    fem_level::{get_fem_level, FemLevelState, FemLevels},
    time::Instant,
    types::{CorrelatorData, SkyCal},
};

/// Linear power gains that undo the front-end attenuation in `state`,
/// `[ant, pol, chan, time]`.
///
/// Discrete levels look up the curve directly. Binned levels take the
/// occupancy-weighted mean of each occupied level's power gain. Only antennas
/// covered by both the state and the curve are included.
pub fn level_power_gains(state: &FemLevelState, curve: &AttenuationCurve) -> Array4<f64> {
    let (num_ants, _, num_times) = state.levels.dim();
    let num_ants = num_ants.min(curve.num_ants());
    let num_chans = curve.attn.len_of(Axis(3));
    Array4::from_shape_fn(
        (num_ants, NUM_POLS, num_chans, num_times),
        |(ant, pol, chan, t)| match &state.levels {
            FemLevels::Discrete(levels) => {
                curve.power_gain(levels[[ant, pol, t]] as usize, ant, pol, chan)
            }
            FemLevels::Occupancy(occupancy) => occupancy[[ant, pol, t]]
                .occupied()
                .map(|(level, fraction)| fraction * curve.power_gain(level, ant, pol, chan))
                .sum(),
        },
    )
}

/// Subtract the receiver background in `skycal` from the total power and the
/// parallel-hand autocorrelations of `data`, at every time.
///
/// # Errors
///
/// [`BadArrayShape`] if the background does not fit the data. Nothing is
/// modified in that case.
pub fn subtract_background(data: &mut CorrelatorData, skycal: &SkyCal) -> Result<(), BadArrayShape> {
    let (num_ants, num_pols, num_chans) = skycal.rcvr_bgd.dim();
    if num_ants > data.p.len_of(Axis(0))
        || num_pols != NUM_POLS
        || num_chans != data.num_chans()
        || skycal.rcvr_bgd_auto.dim() != skycal.rcvr_bgd.dim()
    {
        return Err(BadArrayShape {
            argument: "skycal",
            function: "subtract_background",
            expected: format!("(<={}, {}, {})", data.p.len_of(Axis(0)), NUM_POLS, data.num_chans()),
            received: format!("{:?} and {:?}", skycal.rcvr_bgd.dim(), skycal.rcvr_bgd_auto.dim()),
        });
    }
    for mut p in data.p.slice_mut(s![..num_ants, .., .., ..]).axis_iter_mut(Axis(3)) {
        p -= &skycal.rcvr_bgd;
    }
    for mut a in data
        .a
        .slice_mut(s![..num_ants, ..NUM_POLS, .., ..])
        .axis_iter_mut(Axis(3))
    {
        Zip::from(&mut a)
            .and(&skycal.rcvr_bgd_auto)
            .for_each(|a, &bgd| *a -= bgd);
    }
    Ok(())
}

/// Correct `data` for the front-end attenuation levels in effect while it
/// was taken.
///
/// The attenuation calibration for the date of `gctime` is used, or for the
/// date of the data if not given. If `skycal` is given, its receiver
/// background is subtracted first and is not restored afterwards.
///
/// Always returns a record. If the levels or a calibration cannot be found,
/// the reason is logged and an unchanged copy returned.
pub fn apply_fem_level(
    ctx: &GainCalContext,
    data: &CorrelatorData,
    skycal: Option<&SkyCal>,
    gctime: Option<Instant>,
) -> CorrelatorData {
    trace!("start apply_fem_level");
    let mut corrected = data.clone();
    if let Err(e) = data.validate() {
        error!("{}. No FEM level correction applied!", e);
        return corrected;
    }
    let Some(trange) = data.time_range() else {
        warn!("data has no integrations. No FEM level correction applied!");
        return corrected;
    };
    let Some(store) = ctx.attn_store else {
        info!("no attenuation calibration store. No FEM level correction applied!");
        return corrected;
    };
    let Some(state) = get_fem_level(ctx, trange, data.cadence()) else {
        return corrected;
    };
    let date = gctime.unwrap_or(trange.start);
    let curve = match resolve_measurement(store, date, ctx.config.max_attncal_age_days)
        .map_err(|e| e.to_string())
        .and_then(|m| AttenuationCurve::from_measurement(&m, &data.fghz).map_err(|e| e.to_string()))
    {
        Ok(curve) => curve,
        Err(e) => {
            info!("{}. No FEM level correction applied!", e);
            return corrected;
        }
    };

    let gain = level_power_gains(&state, &curve);
    let time_idx = time_index(&data.time, &state.times);
    if let Some(skycal) = skycal {
        if let Err(e) = subtract_background(&mut corrected, skycal) {
            error!("{}. No FEM level correction applied!", e);
            return data.clone();
        }
    }
    if let Err(e) = apply_antenna_gains(&mut corrected, gain.view(), &time_idx) {
        error!("{}. No FEM level correction applied!", e);
        return data.clone();
    }
    trace!("end apply_fem_level");
    corrected
}
