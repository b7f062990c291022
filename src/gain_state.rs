//! Assembling the analog gain state of the array over a time range.

use log::{error, trace};
use ndarray::{stack, Array2, Array3, Axis};

use crate::{
    context::GainCalContext,
    dcm::{read_dcm, DcmState},
    error::GaincalError,
    resample::{bin_centre_times, bin_means},
    store::{with_session, Column},
    telemetry::{read_antenna_frame, AntennaFrame, ATTN_COLUMNS},
    time::{Instant, TimeRange},
    util::median,
};

/// Front-end and DCM attenuation over a time range.
#[derive(Debug, Clone, PartialEq)]
pub struct GainState {
    /// Timestamp of each sample (bin centres if binned)
    pub times: Vec<Instant>,
    /// First-stage front-end attenuation (dB), `[ant, pol, time]`
    pub first: Array3<f64>,
    /// Second-stage front-end attenuation (dB), `[ant, pol, time]`
    pub second: Array3<f64>,
    /// DCM attenuation
    pub dcm: DcmState,
}

impl GainState {
    /// Number of time samples.
    pub fn num_times(&self) -> usize {
        self.times.len()
    }

    /// Number of bands.
    pub fn num_bands(&self) -> usize {
        self.dcm.num_bands()
    }

    /// Total front-end attenuation (dB), `[ant, pol, time]`.
    pub fn fem_attn(&self) -> Array3<f64> {
        &self.first + &self.second
    }

    /// A single-sample state holding the median of each attenuation over
    /// time, stamped with the median time.
    #[must_use]
    pub fn median_over_time(&self) -> Self {
        let median_time = |a: &Array3<f64>| {
            a.map_axis(Axis(2), |lane| median(&lane.to_vec()))
                .insert_axis(Axis(2))
        };
        let ticks: Vec<f64> = self.times.iter().map(|t| t.ticks() as f64).collect();
        let time = Instant::from_ticks(median(&ticks).round() as i64);
        let offset = self.dcm.offset.as_ref().map(|offset| {
            offset
                .map_axis(Axis(1), |lane| median(&lane.to_vec()))
                .insert_axis(Axis(1))
        });
        Self {
            times: vec![time],
            first: median_time(&self.first),
            second: median_time(&self.second),
            dcm: DcmState {
                attn: self.dcm.attn.clone(),
                offset,
            },
        }
    }
}

/// Stack `[time, ant]` H and V series into `[ant, pol, time]`.
pub(crate) fn stack_pols<T: Clone>(
    h: Array2<T>,
    v: Array2<T>,
) -> Result<Array3<T>, ndarray::ShapeError> {
    stack(Axis(0), &[h.t(), v.t()]).map(|a| a.permuted_axes([1, 0, 2]))
}

/// The time windows a state over `trange` is read from: the query window,
/// widened by half a bin each side when binning, and the binning factor, if
/// any.
pub(crate) fn query_window(trange: TimeRange, dt: Option<usize>) -> (TimeRange, Option<usize>) {
    match dt.filter(|&dt| dt > 1) {
        Some(dt) => (trange.widened(dt), Some(dt)),
        None => (trange, None),
    }
}

fn binned_column(
    frame: &AntennaFrame,
    column: Column,
    dt: Option<usize>,
) -> Result<Array2<f64>, GaincalError> {
    let values = frame.column(column)?;
    Ok(match dt {
        Some(dt) => bin_means(values, dt),
        None => values.to_owned(),
    })
}

/// Read the gain state over `trange`.
///
/// With `dt` above 1, the state is averaged into bins of `dt` seconds and the
/// read window widened to match. With `relax`, the read takes a window's worth
/// of records from the start of `trange` regardless of their timestamps.
///
/// # Errors
///
/// Any failure to read the front-end telemetry or the DCM calibration header.
pub fn try_get_gain_state(
    ctx: &GainCalContext,
    trange: TimeRange,
    dt: Option<usize>,
    relax: bool,
) -> Result<GainState, GaincalError> {
    trace!("start get_gain_state for {}", trange);
    let (window, dt) = query_window(trange, dt);
    let read: Result<_, GaincalError> = with_session(ctx.telemetry, |session| {
        let version = session.schema_version(trange.start)?;
        let mut frame = read_antenna_frame(session, &version, window, &ATTN_COLUMNS, relax)?;
        frame.repair_dead();
        let span = frame.span().unwrap_or(window);

        let times = match dt {
            Some(dt) => bin_centre_times(&frame.timestamps, dt),
            None => frame.timestamps.clone(),
        };
        let [h1, h2, v1, v2] = ATTN_COLUMNS.map(|column| binned_column(&frame, column, dt));
        let first = stack_pols(h1?, v1?)?;
        let second = stack_pols(h2?, v2?)?;

        let dcm = read_dcm(ctx, session, &version, trange, span)?;
        Ok((times, first, second, dcm))
    });
    let (times, first, second, dcm) = read?;
    let state = GainState {
        times,
        first,
        second,
        dcm: dcm.resolve(ctx, trange, dt),
    };
    trace!("end get_gain_state");
    Ok(state)
}

/// Read the gain state over `trange`, as [`try_get_gain_state`], logging and
/// returning `None` on failure.
pub fn get_gain_state(
    ctx: &GainCalContext,
    trange: TimeRange,
    dt: Option<usize>,
    relax: bool,
) -> Option<GainState> {
    try_get_gain_state(ctx, trange, dt, relax)
        .map_err(|e| error!("could not read gain state for {}: {}", trange, e))
        .ok()
}
