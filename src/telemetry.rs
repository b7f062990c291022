//! Reading raw front-end and DCM telemetry out of the state-history store.

use std::collections::BTreeMap;

use log::{debug, error, trace, warn};
use ndarray::{Array2, ArrayView2};

use crate::{
    constants::{NUM_ANTS, NUM_DCM_SLOTS},
    error::GaincalError,
    resample::RepairPlan,
    store::{
        with_session, BandListResolver, Column, ColumnarResult, Query, QueryError, SchemaVersion,
        Table, TelemetrySession, TelemetryStore, TimeFilter,
    },
    time::{Instant, TimeRange},
    util::freq_to_band_idx,
};

/// Front-end attenuator columns: first and second stage, H then V.
pub const ATTN_COLUMNS: [Column; 4] = [
    Column::HPolAtteFirst,
    Column::HPolAtteSecond,
    Column::VPolAtteFirst,
    Column::VPolAtteSecond,
];

/// Front-end attenuation level columns, H then V.
pub const LEVEL_COLUMNS: [Column; 2] = [Column::HPolLevel, Column::VPolLevel];

/// Per-antenna telemetry, de-interleaved to one row per timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AntennaFrame {
    /// Timestamp of each row
    pub timestamps: Vec<Instant>,
    /// Whether each antenna was reporting, `[time, ant]`
    pub live: Array2<bool>,
    columns: BTreeMap<Column, Array2<f64>>,
}

impl AntennaFrame {
    /// Number of timestamps.
    pub fn num_times(&self) -> usize {
        self.timestamps.len()
    }

    /// The `[time, ant]` values of a column.
    ///
    /// # Errors
    ///
    /// [`QueryError::MissingColumn`] if the column was not read.
    pub fn column(&self, column: Column) -> Result<ArrayView2<'_, f64>, QueryError> {
        self.columns
            .get(&column)
            .map(Array2::view)
            .ok_or(QueryError::MissingColumn { column })
    }

    /// The range from the first to the last timestamp actually read.
    pub fn span(&self) -> Option<TimeRange> {
        Some(TimeRange::new(
            *self.timestamps.first()?,
            *self.timestamps.last()?,
        ))
    }

    /// Replace each dead antenna sample in every column with that antenna's
    /// nearest-in-time live sample.
    pub fn repair_dead(&mut self) {
        let plan = RepairPlan::new(&self.timestamps, self.live.view());
        for ant in plan.dead_antennas() {
            warn!("antenna {} reported no live samples; values left as read", ant + 1);
        }
        for values in self.columns.values_mut() {
            plan.apply(values);
        }
    }
}

fn reshape_antenna_major(
    values: &[f64],
    num_times: usize,
) -> Result<Array2<f64>, ndarray::ShapeError> {
    Array2::from_shape_vec(
        (num_times, NUM_ANTS),
        values[..num_times * NUM_ANTS].to_vec(),
    )
}

fn whole_timestamps(result: &ColumnarResult, table: Table) -> usize {
    let rows = result.num_rows();
    let per = table.rows_per_timestamp();
    if rows % per != 0 {
        warn!(
            "{} rows from {:?} table is not a multiple of {}; trailing rows dropped",
            rows, table, per
        );
    }
    rows / per
}

/// Read per-antenna columns over `window`, de-interleaved to `[time, ant]`.
///
/// When `relax` is set the end of the window is ignored. The query instead
/// takes as many rows after the start as the window would have held at one
/// record per second, so a sparse record still yields data.
///
/// # Errors
///
/// Any query failure, or [`GaincalError::NoTelemetry`] if no whole timestamp
/// was returned.
pub fn read_antenna_frame(
    session: &mut dyn TelemetrySession,
    version: &SchemaVersion,
    window: TimeRange,
    columns: &[Column],
    relax: bool,
) -> Result<AntennaFrame, GaincalError> {
    let mut wanted = vec![Column::FemClockMs];
    wanted.extend(columns.iter().filter(|&&c| c != Column::FemClockMs));
    let query = if relax {
        let num_times = (window.duration_secs() - 1).max(1) as usize;
        Query::new(
            version,
            Table::Antenna,
            &wanted,
            TimeFilter::AtOrAfter(window.start),
        )
        .with_limit(num_times * NUM_ANTS)
    } else {
        Query::new(
            version,
            Table::Antenna,
            &wanted,
            TimeFilter::Between(window),
        )
    };
    let result = session.execute(&query)?;
    let num_times = whole_timestamps(&result, Table::Antenna);
    if num_times == 0 {
        return Err(GaincalError::NoTelemetry { range: window });
    }
    debug!("read {} antenna timestamps from {}", num_times, window);

    let timestamps = result
        .ints(Column::Timestamp)?
        .iter()
        .step_by(NUM_ANTS)
        .take(num_times)
        .map(|&t| Instant::from_ticks(t))
        .collect();
    let mut frame_columns = BTreeMap::new();
    for column in wanted {
        let values = result.floats(column)?;
        frame_columns.insert(column, reshape_antenna_major(&values, num_times)?);
    }
    let live = frame_columns
        .get(&Column::FemClockMs)
        .ok_or(QueryError::MissingColumn {
            column: Column::FemClockMs,
        })?
        .mapv(|clock| clock != 0.0);
    Ok(AntennaFrame {
        timestamps,
        live,
        columns: frame_columns,
    })
}

/// Whether DPP offset attenuation was switched on at any point in `window`.
///
/// # Errors
///
/// Any query failure.
pub fn read_dpp_enabled(
    session: &mut dyn TelemetrySession,
    version: &SchemaVersion,
    window: TimeRange,
) -> Result<bool, QueryError> {
    let query = Query::new(
        version,
        Table::System,
        &[Column::DppOffsetAttnOn],
        TimeFilter::Between(window),
    );
    let result = session.execute(&query)?;
    Ok(result
        .floats(Column::DppOffsetAttnOn)?
        .iter()
        .any(|&on| on > 0.0))
}

/// DCM slot offset attenuations over `window`, as `[time, slot]`, with the
/// timestamp of each row.
///
/// # Errors
///
/// Any query failure, or [`GaincalError::NoTelemetry`] if no whole timestamp
/// was returned.
pub fn read_dcm_offsets(
    session: &mut dyn TelemetrySession,
    version: &SchemaVersion,
    window: TimeRange,
) -> Result<(Vec<Instant>, Array2<f64>), GaincalError> {
    let query = Query::new(
        version,
        Table::Slot,
        &[Column::DcmOffsetAttn],
        TimeFilter::Between(window),
    );
    let result = session.execute(&query)?;
    let num_times = whole_timestamps(&result, Table::Slot);
    if num_times == 0 {
        return Err(GaincalError::NoTelemetry { range: window });
    }
    let timestamps = result
        .ints(Column::Timestamp)?
        .iter()
        .step_by(NUM_DCM_SLOTS)
        .take(num_times)
        .map(|&t| Instant::from_ticks(t))
        .collect();
    let values = result.floats(Column::DcmOffsetAttn)?;
    let offsets = Array2::from_shape_vec(
        (num_times, NUM_DCM_SLOTS),
        values[..num_times * NUM_DCM_SLOTS].to_vec(),
    )?;
    Ok((timestamps, offsets))
}

/// The 1-based band number of each DCM slot in the frequency sequence most
/// recently recorded at or before `at`. Slots with no band are 0.
///
/// Returns `Ok(None)` if no sequence was recorded before `at`.
///
/// # Errors
///
/// Any query failure.
pub fn read_band_list(
    session: &mut dyn TelemetrySession,
    version: &SchemaVersion,
    at: Instant,
) -> Result<Option<Vec<usize>>, QueryError> {
    let latest = Query::new(
        version,
        Table::Slot,
        &[Column::FSeqList],
        TimeFilter::AtOrBefore(at),
    )
    .descending()
    .with_limit(1);
    let latest = match session.execute(&latest)?.ints(Column::Timestamp)?.first() {
        Some(&t) => Instant::from_ticks(t),
        None => return Ok(None),
    };
    let sequence = Query::new(
        version,
        Table::Slot,
        &[Column::FSeqList],
        TimeFilter::Between(TimeRange::new(latest, latest)),
    );
    let bands = session
        .execute(&sequence)?
        .floats(Column::FSeqList)?
        .iter()
        .map(|&fghz| freq_to_band_idx(fghz).map_or(0, |idx| idx + 1))
        .collect();
    Ok(Some(bands))
}

/// The default band list resolver, reading the frequency sequence from the
/// state-history store.
#[derive(Clone, Copy)]
pub struct TelemetryBandList<'a>(pub &'a dyn TelemetryStore);

impl BandListResolver for TelemetryBandList<'_> {
    fn active_band_list(&self, at: Instant) -> Option<Vec<usize>> {
        trace!("start active_band_list at {}", at);
        let read: Result<_, QueryError> = with_session(self.0, |session| {
            let version = session.schema_version(at)?;
            read_band_list(session, &version, at)
        });
        match read {
            Ok(Some(bands)) => Some(bands),
            Ok(None) => {
                warn!("no frequency sequence recorded at or before {}", at);
                None
            }
            Err(e) => {
                error!("could not read frequency sequence at {}: {}", at, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::memory::{MemoryTelemetry, Value},
        test_common::{fem_store, T0},
    };

    #[test]
    fn test_frame_deinterleaves_by_antenna() {
        let store = fem_store(3, |t, ant| [ant as i64, 10 * t as i64, 0, 0], |_, _| [3, 4]);
        let mut session = store.open_session().unwrap();
        let version = session.schema_version(T0).unwrap();
        let window = TimeRange::new(T0, T0.add_secs(2));
        let frame =
            read_antenna_frame(session.as_mut(), &version, window, &ATTN_COLUMNS, false).unwrap();

        assert_eq!(frame.num_times(), 3);
        assert_eq!(frame.timestamps[2], T0.add_secs(2));
        let first = frame.column(Column::HPolAtteFirst).unwrap();
        assert_eq!(first[[1, 7]], 7.0);
        let second = frame.column(Column::HPolAtteSecond).unwrap();
        assert_eq!(second[[2, 0]], 20.0);
        assert!(frame.live.iter().all(|&l| l));
    }

    #[test]
    fn test_relaxed_read_ignores_window_end() {
        let store = fem_store(10, |_, _| [1, 1, 1, 1], |_, _| [0, 0]);
        let mut session = store.open_session().unwrap();
        let version = session.schema_version(T0).unwrap();
        // window end precedes every record after the first, but 3 timestamps
        // are still read
        let window = TimeRange::new(T0, T0.add_secs(4));
        let frame =
            read_antenna_frame(session.as_mut(), &version, window, &ATTN_COLUMNS, true).unwrap();
        assert_eq!(frame.num_times(), 3);
    }

    #[test]
    fn test_empty_window_is_no_telemetry() {
        let store = fem_store(2, |_, _| [1, 1, 1, 1], |_, _| [0, 0]);
        let mut session = store.open_session().unwrap();
        let version = session.schema_version(T0).unwrap();
        let window = TimeRange::new(T0.add_secs(100), T0.add_secs(200));
        assert!(matches!(
            read_antenna_frame(session.as_mut(), &version, window, &ATTN_COLUMNS, false),
            Err(GaincalError::NoTelemetry { .. })
        ));
    }

    #[test]
    fn test_band_list_uses_latest_sequence() {
        let mut store = MemoryTelemetry::new(SchemaVersion::new("66").unwrap());
        for (t, f0) in [(0, 1.1), (10, 2.1)] {
            for slot in 0..NUM_DCM_SLOTS {
                let fghz = if slot < 3 { f0 + 0.5 * slot as f64 } else { 0.0 };
                store.push_row(
                    Table::Slot,
                    T0.add_secs(t),
                    [(Column::FSeqList, Value::Float(fghz))],
                );
            }
        }
        let resolver = TelemetryBandList(&store);
        let bands = resolver.active_band_list(T0.add_secs(5)).unwrap();
        assert_eq!(bands.len(), NUM_DCM_SLOTS);
        assert_eq!(&bands[..4], &[1, 2, 3, 0]);
        let bands = resolver.active_band_list(T0.add_secs(50)).unwrap();
        assert_eq!(&bands[..3], &[3, 4, 5]);
        assert_eq!(resolver.active_band_list(T0.add_secs(-1)), None);
        assert_eq!(store.open_sessions(), 0);
    }
}
