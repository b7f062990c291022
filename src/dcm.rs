//! Downconverter module (DCM) attenuation state.
//!
//! Each band has a base DCM attenuation per antenna and polarization, read
//! from the calibration header. When DPP offset attenuation is switched on,
//! each DCM slot additionally carries a time-varying offset, which is mapped
//! onto bands through the frequency sequence in force.

use log::{debug, error, trace, warn};
use ndarray::{Array2, Array3, Axis};

use crate::{
    constants::{NUM_ANTS, NUM_POLS},
    context::GainCalContext,
    error::{BadArrayShape, GaincalError, MissingBandListError},
    resample::bin_means,
    store::{SchemaVersion, TelemetrySession},
    telemetry::{read_dcm_offsets, read_dpp_enabled},
    time::TimeRange,
};

/// DCM attenuation in force over a time range.
#[derive(Debug, Clone, PartialEq)]
pub struct DcmState {
    /// Base attenuation (dB), `[ant, pol, band]`
    pub attn: Array3<f64>,
    /// Per-band offset attenuation (dB), `[band, time]`. Absent when DPP
    /// offset attenuation was off or could not be read.
    pub offset: Option<Array2<f64>>,
}

impl DcmState {
    /// Number of bands.
    pub fn num_bands(&self) -> usize {
        self.attn.dim().2
    }
}

/// Arrange a calibration header's `[band, ant * pol]` table as
/// `[ant, pol, band]`.
///
/// # Errors
///
/// [`BadArrayShape`] if the second axis is not `NUM_ANTS * NUM_POLS` long.
pub fn dcm_attn_by_antenna(table: Array2<f64>) -> Result<Array3<f64>, BadArrayShape> {
    let (num_bands, num_inputs) = table.dim();
    if num_inputs != NUM_ANTS * NUM_POLS {
        return Err(BadArrayShape {
            argument: "table",
            function: "dcm_attn_by_antenna",
            expected: format!("(nbands, {})", NUM_ANTS * NUM_POLS),
            received: format!("{:?}", table.dim()),
        });
    }
    let table = table
        .into_shape_with_order((num_bands, NUM_ANTS, NUM_POLS))
        .map_err(|e| BadArrayShape {
            argument: "table",
            function: "dcm_attn_by_antenna",
            expected: "a contiguous array".to_string(),
            received: e.to_string(),
        })?;
    Ok(table
        .permuted_axes([1, 2, 0])
        .as_standard_layout()
        .into_owned())
}

/// Scatter `[time, slot]` offsets onto `[band, time]` through a list of
/// 1-based band numbers per slot. Bands no slot maps to are zero, and slots
/// with band 0 or a band beyond `num_bands` are ignored.
pub fn offsets_by_band(offsets: &Array2<f64>, band_list: &[usize], num_bands: usize) -> Array2<f64> {
    let num_times = offsets.dim().0;
    let mut by_band = Array2::zeros((num_bands, num_times));
    for (slot, (&band, slot_offsets)) in band_list
        .iter()
        .zip(offsets.axis_iter(Axis(1)))
        .enumerate()
    {
        if band == 0 {
            continue;
        }
        if band > num_bands {
            debug!("slot {} maps to band {} beyond {} bands", slot, band, num_bands);
            continue;
        }
        by_band.row_mut(band - 1).assign(&slot_offsets);
    }
    by_band
}

/// DCM state as read within a store session, with offsets still per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct DcmReading {
    /// Base attenuation (dB), `[ant, pol, band]`
    pub attn: Array3<f64>,
    /// Per-slot offset attenuation (dB), `[time, slot]`. Absent when DPP
    /// offset attenuation was off or could not be read.
    pub slot_offsets: Option<Array2<f64>>,
}

impl DcmReading {
    /// Map the slot offsets onto bands through the band list in force at the
    /// middle of `trange`, binned by `dt` when given. Without a band list the
    /// offsets are dropped and the base attenuation kept.
    ///
    /// Call only once the session the reading was taken in is closed. The
    /// default band list resolver opens a session of its own.
    pub fn resolve(self, ctx: &GainCalContext, trange: TimeRange, dt: Option<usize>) -> DcmState {
        let Self { attn, slot_offsets } = self;
        let offset = slot_offsets.and_then(|offsets| {
            let Some(band_list) = ctx.active_band_list(trange.midpoint()) else {
                error!("{}; DCM offsets ignored", MissingBandListError { range: trange });
                return None;
            };
            let by_band = offsets_by_band(&offsets, &band_list, attn.dim().2);
            Some(match dt {
                Some(dt) => bin_means(by_band.t(), dt).reversed_axes(),
                None => by_band,
            })
        });
        DcmState { attn, offset }
    }
}

fn read_slot_offsets(
    session: &mut dyn TelemetrySession,
    version: &SchemaVersion,
    window: TimeRange,
) -> Option<Array2<f64>> {
    match read_dpp_enabled(session, version, window) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            error!("could not read DPP offset switch for {}: {}", window, e);
            return None;
        }
    }
    match read_dcm_offsets(session, version, window) {
        Ok((_, offsets)) => Some(offsets),
        Err(e) => {
            error!("could not read DCM offsets for {}: {}", window, e);
            None
        }
    }
}

/// Read the DCM state over `trange` within an open session. Base attenuation
/// is taken from the header in force at the start of `trange`, and slot
/// offsets are read over `window`. Finish with [`DcmReading::resolve`] once
/// the session is closed.
///
/// # Errors
///
/// Any failure to read or arrange the calibration header. Offset failures are
/// logged and leave the offset absent.
pub fn read_dcm(
    ctx: &GainCalContext,
    session: &mut dyn TelemetrySession,
    version: &SchemaVersion,
    trange: TimeRange,
    window: TimeRange,
) -> Result<DcmReading, GaincalError> {
    trace!("start read_dcm");
    let attn = dcm_attn_by_antenna(ctx.cal_header.dcm_attenuation(trange.start)?)?;
    if attn.dim().2 == 0 {
        warn!("calibration header at {} lists no bands", trange.start);
    }
    let slot_offsets = read_slot_offsets(session, version, window);
    trace!("end read_dcm");
    Ok(DcmReading { attn, slot_offsets })
}
