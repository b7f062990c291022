// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.
//!
//! The antenna and polarization counts are fixed by the array. The number of
//! bands is *not* a constant: it is discovered from the calibration header at
//! query time (historically 34, later 52).

/// Number of antennas whose front-end gain state is tracked.
pub const NUM_ANTS: usize = 15;
/// Number of polarizations per antenna (H, V).
pub const NUM_POLS: usize = 2;
/// Number of correlator inputs, including the un-tracked reference antenna.
pub const NUM_CORR_ANTS: usize = 16;
/// Number of cross-correlation baselines between [`NUM_CORR_ANTS`] inputs.
pub const NUM_BASELINES: usize = NUM_CORR_ANTS * (NUM_CORR_ANTS - 1) / 2;
/// Polarization products in the cross-correlation tensor: HH, VV, HV, VH.
pub const NUM_CROSS_POL_PRODUCTS: usize = 4;
/// Polarization products in the auto-correlation tensor: aa, bb, ab, ba.
pub const NUM_AUTO_POL_PRODUCTS: usize = 4;

/// Number of DCM slots in a frequency sequence.
pub const NUM_DCM_SLOTS: usize = 50;

/// Number of discrete FEM attenuation levels (0..=15).
pub const NUM_FEM_LEVELS: usize = 16;
/// Number of levels above zero measured by a GAINCALTEST.
pub const NUM_MEASURED_LEVELS: usize = 8;
/// Nominal attenuation step (dB) between unmeasured levels.
pub const FEM_LEVEL_STEP_DB: f64 = 2.0;
/// Attenuation (dB) inserted at the highest FEM level, by convention.
pub const MAX_FEM_LEVEL_ATTN_DB: f64 = 62.0;

/// Seconds in a day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;
/// Julian date of the tick epoch, 1904-01-01 00:00 UTC.
pub const TICK_EPOCH_JD: f64 = 2_416_480.5;
/// Offset between Julian and modified Julian dates.
pub const MJD_OFFSET: f64 = 2_400_000.5;
/// Seconds between the `hifitime` UTC reference (1900-01-01) and the tick
/// epoch (1904-01-01). 1900 is not a leap year, so this is 1460 days.
pub const HIFITIME_TICK_OFFSET: f64 = 1460.0 * SECONDS_PER_DAY;

/// Seconds after the start of a phase-calibration scan at which the
/// instrument is assumed to have settled.
pub const REF_SETTLE_SECS: i64 = 60;
/// Length of the window over which a reference gain state is sampled.
pub const REF_WINDOW_SECS: i64 = 61;
/// UTC clock time used as a reference when no calibration scan is usable.
pub const FALLBACK_REF_CLOCK: (u8, u8) = (13, 30);
/// A reference older than this (days) relative to the observation is stale.
pub const MAX_REF_AGE_DAYS: f64 = 2.0;
/// A stored attenuation curve older than this (days) is re-measured.
pub const MAX_ATTNCAL_AGE_DAYS: f64 = 1.0;
/// Hour of the observation day (UTC) from which phase-cal scans are sought.
pub const PHASECAL_SEARCH_START_HOURS: f64 = 10.0;

/// Decimal places to which frequencies are rounded before being matched.
pub const FREQ_MATCH_DECIMALS: i32 = 4;
