//! Choosing the reference epoch that gain changes are measured against.
//!
//! A reference is found by trying an ordered list of strategies until one
//! yields a usable gain state. Each failed strategy reports why, and the
//! reasons are kept if every strategy fails.

use lazy_static::lazy_static;
use log::{info, trace, warn};
use regex::Regex;

use crate::{
    context::GainCalContext,
    error::GaincalError,
    gain_state::{try_get_gain_state, GainState},
    time::{Instant, TimeRange},
};

lazy_static! {
    static ref RE_SCAN_NAME: Regex =
        Regex::new(r"IDB(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})(?P<hour>\d{2})(?P<minute>\d{2})(?P<second>\d{2})")
            .unwrap();
}

/// The start time encoded in a scan name such as `IDB20170910183508`.
pub fn scan_start(name: &str) -> Option<Instant> {
    let caps = RE_SCAN_NAME.captures(name)?;
    let field = |group: &str| caps.name(group)?.as_str().parse::<u8>().ok();
    let year = caps.name("year")?.as_str().parse::<i32>().ok()?;
    let (month, day) = (field("month")?, field("day")?);
    let (hour, minute, second) = (field("hour")?, field("minute")?, field("second")?);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 60
    {
        return None;
    }
    Some(Instant::from_gregorian(year, month, day, hour, minute, second))
}

/// A way of choosing a reference instant for an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceStrategy {
    /// Shortly after the start of the observation day's first phase
    /// calibration scan
    FirstPhaseCal,
    /// The reference calibration time recorded in the calibration header
    RefcalHeader,
    /// A fixed clock time on the observation day, read leniently
    FixedClock,
}

/// The strategies `apply_gain_corr` tries by default.
pub const APPLY_GAIN_CORR_STRATEGIES: [ReferenceStrategy; 2] =
    [ReferenceStrategy::FirstPhaseCal, ReferenceStrategy::FixedClock];

/// The strategies `get_gain_corr` tries by default.
pub const GET_GAIN_CORR_STRATEGIES: [ReferenceStrategy; 2] =
    [ReferenceStrategy::RefcalHeader, ReferenceStrategy::FixedClock];

/// A resolved reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEpoch {
    /// The reference instant
    pub tref: Instant,
    /// The strategy that found it, `None` if supplied by the caller
    pub strategy: Option<ReferenceStrategy>,
    /// The median gain state over the reference window
    pub state: GainState,
}

fn reference_state(
    ctx: &GainCalContext,
    tref: Instant,
    relax: bool,
) -> Result<GainState, GaincalError> {
    let window = TimeRange::new(tref, tref.add_secs(ctx.config.ref_window_secs));
    Ok(try_get_gain_state(ctx, window, None, relax)?.median_over_time())
}

impl ReferenceStrategy {
    /// The candidate instant, and whether to read it leniently.
    fn locate(self, ctx: &GainCalContext, obs_start: Instant) -> Result<(Instant, bool), String> {
        let config = &ctx.config;
        match self {
            Self::FirstPhaseCal => {
                let locator = ctx
                    .scan_locator
                    .ok_or_else(|| "no scan locator configured".to_string())?;
                let day = obs_start.start_of_day();
                let search_start = (config.phasecal_search_start_hours * 3600.0).round() as i64;
                let range = TimeRange::new(day.add_secs(search_start), day.add_secs(86_400));
                let scans = locator.find_scans(range).map_err(|e| e.to_string())?;
                let first = scans
                    .first()
                    .ok_or_else(|| format!("no phase calibration scans in {range}"))?;
                let start = scan_start(first).ok_or_else(|| format!("unrecognised scan name {first}"))?;
                Ok((start.add_secs(config.ref_settle_secs), false))
            }
            Self::RefcalHeader => ctx
                .cal_header
                .refcal_time(obs_start)
                .map(|t| (t, false))
                .map_err(|e| e.to_string()),
            Self::FixedClock => {
                let (hour, minute) = config.fallback_ref_clock;
                Ok((obs_start.at_clock(hour, minute), true))
            }
        }
    }

    /// Resolve a reference for an observation starting at `obs_start`.
    ///
    /// # Errors
    ///
    /// Why the strategy could not be used: no candidate, a candidate too old
    /// for the observation, or a failure to read its gain state.
    pub fn resolve(self, ctx: &GainCalContext, obs_start: Instant) -> Result<ReferenceEpoch, String> {
        let (tref, relax) = self.locate(ctx, obs_start)?;
        let age = obs_start.days_since(tref);
        if age > ctx.config.max_ref_age_days {
            return Err(format!(
                "reference at {tref} is {age:.1} days before the observation"
            ));
        }
        let state = reference_state(ctx, tref, relax).map_err(|e| e.to_string())?;
        Ok(ReferenceEpoch {
            tref,
            strategy: Some(self),
            state,
        })
    }
}

/// Try `strategies` in order, returning the first usable reference.
///
/// # Errors
///
/// [`GaincalError::NoReference`] with every strategy's reason if none works.
pub fn resolve_reference(
    ctx: &GainCalContext,
    obs_start: Instant,
    strategies: &[ReferenceStrategy],
) -> Result<ReferenceEpoch, GaincalError> {
    trace!("start resolve_reference");
    let mut reasons = Vec::with_capacity(strategies.len());
    for &strategy in strategies {
        match strategy.resolve(ctx, obs_start) {
            Ok(epoch) => {
                info!("using {:?} reference at {}", strategy, epoch.tref);
                return Ok(epoch);
            }
            Err(reason) => {
                warn!("{:?} reference unusable: {}", strategy, reason);
                reasons.push(format!("{strategy:?}: {reason}"));
            }
        }
    }
    Err(GaincalError::NoReference { reasons })
}

/// The reference at a caller-supplied instant.
///
/// # Errors
///
/// Any failure to read the gain state at `tref`.
pub fn reference_at(ctx: &GainCalContext, tref: Instant) -> Result<ReferenceEpoch, GaincalError> {
    Ok(ReferenceEpoch {
        tref,
        strategy: None,
        state: reference_state(ctx, tref, false)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::memory::MemoryScanLocator,
        test_common::{constant_gain_store, header, test_context, Fixture, T0},
    };

    #[test]
    fn test_scan_start() {
        assert_eq!(
            scan_start("/data1/IDB/IDB20170910183508"),
            Some(Instant::from_gregorian(2017, 9, 10, 18, 35, 8))
        );
        assert_eq!(scan_start("IDB2017091018350"), None);
        assert_eq!(scan_start("IDB20171310183508"), None);
        assert_eq!(scan_start("UDB20170910183508"), None);
    }

    #[test]
    fn test_first_phasecal_reference() {
        // T0 is 2017-09-10 18:00; the phase-cal scan at 16:00 is the first
        // after 10:00
        let scan_t = Instant::from_gregorian(2017, 9, 10, 16, 0, 0);
        let mut fixture = Fixture::new(
            constant_gain_store(Instant::from_gregorian(2017, 9, 10, 15, 59, 0), 180, [1, 2, 3, 4]),
            header(4),
        );
        fixture.scans = MemoryScanLocator {
            scans: vec![
                "IDB20170910080000".to_string(),
                "IDB20170910190000".to_string(),
                "IDB20170910160000".to_string(),
            ],
        };
        let ctx = test_context(&fixture);
        let epoch = resolve_reference(&ctx, T0, &APPLY_GAIN_CORR_STRATEGIES).unwrap();
        assert_eq!(epoch.strategy, Some(ReferenceStrategy::FirstPhaseCal));
        assert_eq!(epoch.tref, scan_t.add_secs(60));
        assert_eq!(epoch.state.num_times(), 1);
        assert_eq!(epoch.state.first[[0, 0, 0]], 1.0);
        assert_eq!(fixture.telemetry.open_sessions(), 0);
    }

    #[test]
    fn test_falls_back_to_fixed_clock() {
        // no scans at all, but telemetry from 13:30
        let fixture = Fixture::new(
            constant_gain_store(Instant::from_gregorian(2017, 9, 10, 13, 30, 0), 90, [1, 2, 3, 4]),
            header(4),
        );
        let ctx = test_context(&fixture);
        let epoch = resolve_reference(&ctx, T0, &APPLY_GAIN_CORR_STRATEGIES).unwrap();
        assert_eq!(epoch.strategy, Some(ReferenceStrategy::FixedClock));
        assert_eq!(epoch.tref, Instant::from_gregorian(2017, 9, 10, 13, 30, 0));
    }

    #[test]
    fn test_stale_refcal_is_skipped() {
        let mut fixture = Fixture::new(
            constant_gain_store(Instant::from_gregorian(2017, 9, 10, 13, 30, 0), 90, [1, 2, 3, 4]),
            header(4),
        );
        fixture.header.refcal_time = Some(T0.add_secs(-3 * 86_400));
        let ctx = test_context(&fixture);
        let epoch = resolve_reference(&ctx, T0, &GET_GAIN_CORR_STRATEGIES).unwrap();
        assert_eq!(epoch.strategy, Some(ReferenceStrategy::FixedClock));
    }

    #[test]
    fn test_all_strategies_fail() {
        let fixture = Fixture::new(
            constant_gain_store(T0.add_secs(-86_400), 10, [1, 2, 3, 4]),
            header(4),
        );
        let ctx = test_context(&fixture);
        match resolve_reference(&ctx, T0, &GET_GAIN_CORR_STRATEGIES) {
            Err(GaincalError::NoReference { reasons }) => assert_eq!(reasons.len(), 2),
            other => panic!("expected no reference, got {other:?}"),
        }
        assert_eq!(fixture.telemetry.open_sessions(), 0);
    }
}
