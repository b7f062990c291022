//! Instants and time ranges in the stateframe's native tick scale.
//!
//! A tick is one second since 1904-01-01 00:00 UTC, with no leap seconds, which
//! is the time the telemetry store indexes its records by. Correlator data
//! carries Julian dates instead; both convert losslessly to tick resolution.

use std::fmt::{self, Display};

use hifitime::Epoch;

use crate::{
    constants::{HIFITIME_TICK_OFFSET, MJD_OFFSET, SECONDS_PER_DAY, TICK_EPOCH_JD},
    util::median,
};

const SECONDS_PER_DAY_I64: i64 = SECONDS_PER_DAY as i64;

/// An absolute timestamp, stored as integer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant(i64);

impl Instant {
    /// Create an instant from integer ticks.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// The number of ticks since the tick epoch.
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Create an instant from a Julian date, rounding to the nearest tick.
    pub fn from_jd(jd: f64) -> Self {
        Self(((jd - TICK_EPOCH_JD) * SECONDS_PER_DAY).round() as i64)
    }

    /// The Julian date of this instant.
    pub fn to_jd(self) -> f64 {
        self.0 as f64 / SECONDS_PER_DAY + TICK_EPOCH_JD
    }

    /// Create an instant from a modified Julian date, rounding to the nearest
    /// tick.
    pub fn from_mjd(mjd: f64) -> Self {
        Self::from_jd(mjd + MJD_OFFSET)
    }

    /// The modified Julian date of this instant.
    pub fn to_mjd(self) -> f64 {
        self.to_jd() - MJD_OFFSET
    }

    /// Create an instant from a [`hifitime::Epoch`], rounding to the nearest
    /// tick.
    pub fn from_epoch(epoch: Epoch) -> Self {
        Self((epoch.to_utc_seconds() - HIFITIME_TICK_OFFSET).round() as i64)
    }

    /// This instant as a [`hifitime::Epoch`].
    pub fn to_epoch(self) -> Epoch {
        Epoch::from_utc_seconds(self.0 as f64 + HIFITIME_TICK_OFFSET)
    }

    /// Create an instant from a Gregorian UTC date and time.
    pub fn from_gregorian(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self::from_epoch(Epoch::from_gregorian_utc_hms(
            year, month, day, hour, minute, second,
        ))
    }

    /// The Gregorian UTC `(year, month, day, hour, minute, second)` of this
    /// instant.
    pub fn to_gregorian(self) -> (i32, u8, u8, u8, u8, u8) {
        let (year, month, day, hour, minute, second, _) = self.to_epoch().to_gregorian_utc();
        (year, month, day, hour, minute, second)
    }

    /// Midnight UTC at the start of this instant's day.
    pub fn start_of_day(self) -> Self {
        Self(self.0 - self.0.rem_euclid(SECONDS_PER_DAY_I64))
    }

    /// The same UTC date as this instant, at the given clock time.
    pub fn at_clock(self, hour: u8, minute: u8) -> Self {
        self.start_of_day()
            .add_secs(i64::from(hour) * 3600 + i64::from(minute) * 60)
    }

    /// This instant shifted by a (possibly negative) number of seconds.
    #[must_use]
    pub const fn add_secs(self, secs: i64) -> Self {
        Self(self.0 + secs)
    }

    /// Days elapsed from `earlier` to this instant (negative if `earlier` is
    /// in fact later).
    pub fn days_since(self, earlier: Self) -> f64 {
        (self.0 - earlier.0) as f64 / SECONDS_PER_DAY
    }
}

impl Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (year, month, day, hour, minute, second) = self.to_gregorian();
        write!(
            f,
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
        )
    }
}

/// An ordered pair of instants. Telemetry queries treat both ends as
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// First instant in the range
    pub start: Instant,
    /// Last instant in the range
    pub end: Instant,
}

impl TimeRange {
    /// Create a new range. The ends are swapped if given out of order.
    pub fn new(start: Instant, end: Instant) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// The range spanning the first and last of a list of Julian dates, or
    /// `None` if the list is empty.
    pub fn from_jd_times(jd_times: &[f64]) -> Option<Self> {
        let (first, last) = (jd_times.first()?, jd_times.last()?);
        Some(Self::new(Instant::from_jd(*first), Instant::from_jd(*last)))
    }

    /// The number of seconds from start to end.
    pub const fn duration_secs(&self) -> i64 {
        self.end.0 - self.start.0
    }

    /// The midpoint of the range, truncated to a whole tick.
    pub const fn midpoint(&self) -> Instant {
        Instant(self.start.0 + (self.end.0 - self.start.0) / 2)
    }

    /// The range widened by half of `dt` seconds on each side. Odd `dt` gives
    /// a half-second edge, which is rounded half-to-even.
    #[must_use]
    pub fn widened(&self, dt: usize) -> Self {
        let half = dt as f64 / 2.0;
        Self {
            start: Instant((self.start.0 as f64 - half).round_ties_even() as i64),
            end: Instant((self.end.0 as f64 + half).round_ties_even() as i64),
        }
    }

    /// Whether `t` falls within the range, ends included.
    pub fn contains(&self, t: Instant) -> bool {
        self.start <= t && t <= self.end
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// The integration cadence of a series of Julian-date timestamps, in whole
/// seconds, or `None` if the data is at native (1 s) cadence or too short to
/// tell.
pub fn cadence_secs(jd_times: &[f64]) -> Option<usize> {
    if jd_times.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = jd_times.windows(2).map(|w| w[1] - w[0]).collect();
    let dt = (median(&diffs) * SECONDS_PER_DAY).round();
    if dt > 1.0 {
        Some(dt as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_tick_epoch_is_jd_epoch() {
        assert_abs_diff_eq!(Instant::from_ticks(0).to_jd(), TICK_EPOCH_JD);
        assert_eq!(Instant::from_jd(TICK_EPOCH_JD), Instant::from_ticks(0));
    }

    #[test]
    fn test_jd_round_trip_is_lossless() {
        for ticks in [0, 1, 3_587_846_400, 3_587_895_001, 3_700_000_017] {
            let t = Instant::from_ticks(ticks);
            assert_eq!(Instant::from_jd(t.to_jd()), t);
            assert_eq!(Instant::from_mjd(t.to_mjd()), t);
        }
    }

    #[test]
    fn test_gregorian() {
        // 2017-09-10 00:00 UTC is unix 1505001600, and unix 0 is tick 2082844800
        let t = Instant::from_gregorian(2017, 9, 10, 0, 0, 0);
        assert_eq!(t.ticks(), 1_505_001_600 + 2_082_844_800);
        assert_eq!(t.to_gregorian(), (2017, 9, 10, 0, 0, 0));
        assert_eq!(format!("{}", t.add_secs(3661)), "2017-09-10 01:01:01");
    }

    #[test]
    fn test_at_clock() {
        let t = Instant::from_gregorian(2017, 9, 10, 18, 35, 8);
        assert_eq!(t.at_clock(13, 30), Instant::from_gregorian(2017, 9, 10, 13, 30, 0));
        assert_eq!(t.start_of_day(), Instant::from_gregorian(2017, 9, 10, 0, 0, 0));
    }

    #[test]
    fn test_widened_rounds_half_to_even() {
        let range = TimeRange::new(Instant::from_ticks(100), Instant::from_ticks(200));
        let even = range.widened(4);
        assert_eq!(even.start.ticks(), 98);
        assert_eq!(even.end.ticks(), 202);
        // 100 - 1.5 = 98.5 -> 98, 200 + 1.5 = 201.5 -> 202
        let odd = range.widened(3);
        assert_eq!(odd.start.ticks(), 98);
        assert_eq!(odd.end.ticks(), 202);
    }

    #[test]
    fn test_range_orders_ends() {
        let range = TimeRange::new(Instant::from_ticks(9), Instant::from_ticks(3));
        assert_eq!(range.start.ticks(), 3);
        assert_eq!(range.duration_secs(), 6);
        assert_eq!(range.midpoint().ticks(), 6);
    }

    #[test]
    fn test_cadence() {
        let t0 = Instant::from_gregorian(2017, 9, 10, 18, 0, 0);
        let one_sec: Vec<f64> = (0..10).map(|i| t0.add_secs(i).to_jd()).collect();
        assert_eq!(cadence_secs(&one_sec), None);
        let one_min: Vec<f64> = (0..10).map(|i| t0.add_secs(60 * i).to_jd()).collect();
        assert_eq!(cadence_secs(&one_min), Some(60));
        assert_eq!(cadence_secs(&one_min[..1]), None);
    }
}
