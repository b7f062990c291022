//! Discrete front-end attenuation levels over a time range.
//!
//! The front end steps its attenuation through [`NUM_FEM_LEVELS`] discrete
//! levels. At native cadence the level at each second is kept as-is. When the
//! state is binned, each bin instead records how long was spent at each level.

use log::{error, trace, warn};
use ndarray::{Array2, Array3, ArrayView2};

use crate::{
    constants::NUM_FEM_LEVELS,
    context::GainCalContext,
    dcm::{read_dcm, DcmState},
    error::GaincalError,
    gain_state::{query_window, stack_pols},
    resample::{bin_centre_times, bin_occupancy, LevelOccupancy},
    store::with_session,
    telemetry::{read_antenna_frame, LEVEL_COLUMNS},
    time::{Instant, TimeRange},
};

/// Attenuation levels, `[ant, pol, time]`.
#[derive(Debug, Clone, PartialEq)]
pub enum FemLevels {
    /// The level at each sample
    Discrete(Array3<u8>),
    /// Time spent at each level within each bin
    Occupancy(Array3<LevelOccupancy>),
}

impl FemLevels {
    /// `(ant, pol, time)`
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::Discrete(levels) => levels.dim(),
            Self::Occupancy(occupancy) => occupancy.dim(),
        }
    }
}

/// Front-end levels with the DCM state over the same range.
#[derive(Debug, Clone, PartialEq)]
pub struct FemLevelState {
    /// Timestamp of each sample (bin centres if binned)
    pub times: Vec<Instant>,
    /// Front-end levels
    pub levels: FemLevels,
    /// DCM attenuation
    pub dcm: DcmState,
}

impl FemLevelState {
    /// Number of time samples.
    pub fn num_times(&self) -> usize {
        self.times.len()
    }
}

fn to_levels(values: ArrayView2<f64>) -> Array2<u8> {
    let max = (NUM_FEM_LEVELS - 1) as f64;
    let mut clamped = 0usize;
    let levels = values.mapv(|v| {
        if !(0.0..=max).contains(&v) {
            clamped += 1;
        }
        v.round().clamp(0.0, max) as u8
    });
    if clamped > 0 {
        warn!("{} FEM level readings outside 0..={} were clamped", clamped, max);
    }
    levels
}

/// Read the front-end levels over `trange`, binned by `dt` seconds when
/// above 1.
///
/// # Errors
///
/// Any failure to read the front-end telemetry or the DCM calibration header.
pub fn try_get_fem_level(
    ctx: &GainCalContext,
    trange: TimeRange,
    dt: Option<usize>,
) -> Result<FemLevelState, GaincalError> {
    trace!("start get_fem_level for {}", trange);
    let (window, dt) = query_window(trange, dt);
    let read: Result<_, GaincalError> = with_session(ctx.telemetry, |session| {
        let version = session.schema_version(trange.start)?;
        let mut frame = read_antenna_frame(session, &version, window, &LEVEL_COLUMNS, false)?;
        frame.repair_dead();
        let span = frame.span().unwrap_or(window);

        let [h, v] = LEVEL_COLUMNS.map(|column| frame.column(column).map(to_levels));
        let (h, v) = (h?, v?);
        let (times, levels) = match dt {
            Some(dt) => (
                bin_centre_times(&frame.timestamps, dt),
                FemLevels::Occupancy(stack_pols(
                    bin_occupancy(h.view(), dt),
                    bin_occupancy(v.view(), dt),
                )?),
            ),
            None => (
                frame.timestamps.clone(),
                FemLevels::Discrete(stack_pols(h, v)?),
            ),
        };

        let dcm = read_dcm(ctx, session, &version, trange, span)?;
        Ok((times, levels, dcm))
    });
    let (times, levels, dcm) = read?;
    let dcm = dcm.resolve(ctx, trange, dt);
    trace!("end get_fem_level");
    Ok(FemLevelState { times, levels, dcm })
}

/// Read the front-end levels over `trange`, as [`try_get_fem_level`], logging
/// and returning `None` on failure.
pub fn get_fem_level(
    ctx: &GainCalContext,
    trange: TimeRange,
    dt: Option<usize>,
) -> Option<FemLevelState> {
    try_get_fem_level(ctx, trange, dt)
        .map_err(|e| error!("could not read FEM levels for {}: {}", trange, e))
        .ok()
}
