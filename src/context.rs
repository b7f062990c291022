//! The collaborators and settings every gain operation runs against.

use std::fmt::{self, Display};

use derive_builder::Builder;

use crate::{
    constants::{
        FALLBACK_REF_CLOCK, MAX_ATTNCAL_AGE_DAYS, MAX_REF_AGE_DAYS, PHASECAL_SEARCH_START_HOURS,
        REF_SETTLE_SECS, REF_WINDOW_SECS,
    },
    store::{AttnCalStore, BandListResolver, CalHeaderReader, ScanLocator, TelemetryStore},
    telemetry::TelemetryBandList,
    time::Instant,
};

/// Tunable settings for reference selection and calibration freshness.
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct GainCalConfig {
    /// Seconds after the start of a phase-calibration scan at which the
    /// reference window opens
    #[builder(default = "REF_SETTLE_SECS")]
    pub ref_settle_secs: i64,
    /// Length in seconds of the reference window
    #[builder(default = "REF_WINDOW_SECS")]
    pub ref_window_secs: i64,
    /// UTC `(hour, minute)` used as a reference when nothing better is found
    #[builder(default = "FALLBACK_REF_CLOCK")]
    pub fallback_ref_clock: (u8, u8),
    /// Hour of the observation's UTC day from which phase-cal scans are sought
    #[builder(default = "PHASECAL_SEARCH_START_HOURS")]
    pub phasecal_search_start_hours: f64,
    /// A reference more than this many days before the observation is stale
    #[builder(default = "MAX_REF_AGE_DAYS")]
    pub max_ref_age_days: f64,
    /// A stored attenuation curve more than this many days old is re-measured
    #[builder(default = "MAX_ATTNCAL_AGE_DAYS")]
    pub max_attncal_age_days: f64,
}

impl Default for GainCalConfig {
    fn default() -> Self {
        Self {
            ref_settle_secs: REF_SETTLE_SECS,
            ref_window_secs: REF_WINDOW_SECS,
            fallback_ref_clock: FALLBACK_REF_CLOCK,
            phasecal_search_start_hours: PHASECAL_SEARCH_START_HOURS,
            max_ref_age_days: MAX_REF_AGE_DAYS,
            max_attncal_age_days: MAX_ATTNCAL_AGE_DAYS,
        }
    }
}

/// Everything a gain operation needs to reach the outside world.
///
/// Only the state-history store and the calibration header are required. The
/// band list is read from the state-history store unless a resolver is
/// given. Operations that need a missing optional collaborator report it and
/// fall back.
#[derive(Builder, Clone)]
pub struct GainCalContext<'a> {
    /// The state-history store
    pub telemetry: &'a dyn TelemetryStore,
    /// The calibration header store
    pub cal_header: &'a dyn CalHeaderReader,
    /// Resolves the DCM band list
    #[builder(default, setter(strip_option))]
    pub band_list: Option<&'a dyn BandListResolver>,
    /// Finds phase-calibration scans
    #[builder(default, setter(strip_option))]
    pub scan_locator: Option<&'a dyn ScanLocator>,
    /// Source of FEM attenuation curves
    #[builder(default, setter(strip_option))]
    pub attn_store: Option<&'a dyn AttnCalStore>,
    /// Settings
    #[builder(default)]
    pub config: GainCalConfig,
}

impl GainCalContext<'_> {
    /// The band list in force at `at`, from the configured resolver or else
    /// the state-history store.
    pub fn active_band_list(&self, at: Instant) -> Option<Vec<usize>> {
        match self.band_list {
            Some(resolver) => resolver.active_band_list(at),
            None => TelemetryBandList(self.telemetry).active_band_list(at),
        }
    }
}

impl Display for GainCalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} resolve band lists through a dedicated resolver.",
            if self.band_list.is_some() {
                "Will"
            } else {
                "Will not"
            }
        )?;
        writeln!(
            f,
            "{} search for phase-calibration scans.",
            if self.scan_locator.is_some() {
                "Will"
            } else {
                "Will not"
            }
        )?;
        writeln!(
            f,
            "{} correct FEM attenuation levels.",
            if self.attn_store.is_some() {
                "Will"
            } else {
                "Will not"
            }
        )?;
        let (hour, minute) = self.config.fallback_ref_clock;
        writeln!(
            f,
            "Fallback reference at {hour:02}:{minute:02} UTC, stale after {} days.",
            self.config.max_ref_age_days
        )
    }
}
