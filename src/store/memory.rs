//! In-memory implementations of the store interfaces, for tests, benchmarks
//! and offline replays.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

use log::trace;
use ndarray::Array2;

use super::{
    AttnCalStore, AttnStoreError, BandListResolver, CalHeaderError, CalHeaderReader, CalKind,
    Column, ColumnData, ColumnarResult, Order, Query, QueryError, ScanLocator, ScanLocatorError,
    SchemaVersion, Table, TelemetrySession, TelemetryStore,
};
use crate::{
    attn_curve::AttenuationMeasurement,
    constants::NUM_ANTS,
    time::{Instant, TimeRange},
};

/// A single stored value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

#[derive(Debug, Clone)]
struct Row {
    timestamp: Instant,
    values: BTreeMap<Column, Value>,
}

/// A state-history store held in memory.
///
/// Rows are kept per table in insertion order. Sessions are counted so that
/// callers can check none are leaked.
#[derive(Debug)]
pub struct MemoryTelemetry {
    version: SchemaVersion,
    tables: HashMap<Table, Vec<Row>>,
    rejected: HashSet<Table>,
    unreachable: bool,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
}

impl MemoryTelemetry {
    /// An empty store reporting `version` for every instant.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            tables: HashMap::new(),
            rejected: HashSet::new(),
            unreachable: false,
            open_sessions: AtomicUsize::new(0),
            sessions_opened: AtomicUsize::new(0),
        }
    }

    /// Append a row to a table.
    pub fn push_row(
        &mut self,
        table: Table,
        timestamp: Instant,
        values: impl IntoIterator<Item = (Column, Value)>,
    ) {
        self.tables.entry(table).or_default().push(Row {
            timestamp,
            values: values.into_iter().collect(),
        });
    }

    /// Append one row per antenna at `timestamp`, taking antenna `i`'s value
    /// of each column from the `i`th element of its array.
    pub fn push_antenna_rows(&mut self, timestamp: Instant, columns: &[(Column, [i64; NUM_ANTS])]) {
        for ant in 0..NUM_ANTS {
            self.push_row(
                Table::Antenna,
                timestamp,
                columns.iter().map(|(c, v)| (*c, Value::Int(v[ant]))),
            );
        }
    }

    /// Make every query against `table` fail.
    pub fn reject_table(&mut self, table: Table) {
        self.rejected.insert(table);
    }

    /// Make opening a session fail.
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Number of sessions opened over the life of the store.
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    fn run(&self, query: &Query) -> Result<ColumnarResult, QueryError> {
        let table_name = query.table.name(&query.version);
        if self.rejected.contains(&query.table) {
            return Err(QueryError::Rejected {
                table: table_name,
                message: "table rejected by store".to_string(),
            });
        }
        let mut rows: Vec<&Row> = self
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.matches(row.timestamp))
                    .collect()
            })
            .unwrap_or_default();
        // stable sorts keep rows sharing a timestamp in insertion order
        match query.order {
            Order::Ascending => rows.sort_by_key(|row| row.timestamp),
            Order::Descending => rows.sort_by_key(|row| std::cmp::Reverse(row.timestamp)),
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        let mut result = ColumnarResult::default();
        for &column in &query.columns {
            if column == Column::Timestamp {
                let ticks = rows.iter().map(|row| row.timestamp.ticks()).collect();
                result.insert(column, ColumnData::Int(ticks));
                continue;
            }
            let values = rows
                .iter()
                .map(|row| row.values.get(&column).copied())
                .collect::<Option<Vec<_>>>()
                .ok_or(QueryError::MissingColumn { column })?;
            let data = if values.iter().all(|v| matches!(v, Value::Int(_))) {
                ColumnData::Int(
                    values
                        .iter()
                        .filter_map(|v| match v {
                            Value::Int(i) => Some(*i),
                            Value::Float(_) => None,
                        })
                        .collect(),
                )
            } else {
                ColumnData::Float(
                    values
                        .iter()
                        .map(|v| match *v {
                            Value::Int(i) => i as f64,
                            Value::Float(f) => f,
                        })
                        .collect(),
                )
            };
            result.insert(column, data);
        }
        Ok(result)
    }
}

struct MemorySession<'a> {
    store: &'a MemoryTelemetry,
}

impl TelemetrySession for MemorySession<'_> {
    fn schema_version(&mut self, _at: Instant) -> Result<SchemaVersion, QueryError> {
        Ok(self.store.version.clone())
    }

    fn execute(&mut self, query: &Query) -> Result<ColumnarResult, QueryError> {
        trace!("{}", query.to_sql().text);
        self.store.run(query)
    }
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        self.store.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TelemetryStore for MemoryTelemetry {
    fn open_session(&self) -> Result<Box<dyn TelemetrySession + '_>, QueryError> {
        if self.unreachable {
            return Err(QueryError::Connection {
                message: "store marked unreachable".to_string(),
            });
        }
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession { store: self }))
    }
}

/// A calibration header store holding one record of each kind.
#[derive(Debug, Clone, Default)]
pub struct MemoryCalHeader {
    /// DCM attenuation, `[band, NUM_ANTS * NUM_POLS]`
    pub dcm_attn: Option<Array2<f64>>,
    /// Reference calibration time
    pub refcal_time: Option<Instant>,
}

impl CalHeaderReader for MemoryCalHeader {
    fn dcm_attenuation(&self, at: Instant) -> Result<Array2<f64>, CalHeaderError> {
        self.dcm_attn.clone().ok_or(CalHeaderError::NotFound {
            kind: CalKind::DcmAttenuation,
            at,
        })
    }

    fn refcal_time(&self, at: Instant) -> Result<Instant, CalHeaderError> {
        self.refcal_time.ok_or(CalHeaderError::NotFound {
            kind: CalKind::RefcalTime,
            at,
        })
    }
}

/// A band list that never changes.
#[derive(Debug, Clone, Default)]
pub struct FixedBandList(pub Option<Vec<usize>>);

impl BandListResolver for FixedBandList {
    fn active_band_list(&self, _at: Instant) -> Option<Vec<usize>> {
        self.0.clone()
    }
}

/// A scan locator over a fixed list of scan names.
#[derive(Debug, Clone, Default)]
pub struct MemoryScanLocator {
    /// Scan names, `IDByyyymmddhhmmss`
    pub scans: Vec<String>,
}

impl ScanLocator for MemoryScanLocator {
    fn find_scans(&self, range: TimeRange) -> Result<Vec<String>, ScanLocatorError> {
        let mut found: Vec<(Instant, String)> = self
            .scans
            .iter()
            .filter_map(|name| crate::reference::scan_start(name).map(|t| (t, name.clone())))
            .filter(|(t, _)| range.contains(*t))
            .collect();
        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }
}

/// An attenuation calibration store held in memory.
#[derive(Debug, Default)]
pub struct MemoryAttnStore {
    stored: RefCell<Vec<AttenuationMeasurement>>,
    measurable: Option<AttenuationMeasurement>,
    fail_writes: bool,
}

impl MemoryAttnStore {
    /// A store holding `stored`, able to measure `measurable` from scans.
    pub fn new(stored: Vec<AttenuationMeasurement>, measurable: Option<AttenuationMeasurement>) -> Self {
        Self {
            stored: RefCell::new(stored),
            measurable,
            fail_writes: false,
        }
    }

    /// Make every write fail.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Measurements currently stored.
    pub fn stored(&self) -> Vec<AttenuationMeasurement> {
        self.stored.borrow().clone()
    }
}

impl AttnCalStore for MemoryAttnStore {
    fn read_stored(&self, date: Instant) -> Result<AttenuationMeasurement, AttnStoreError> {
        self.stored
            .borrow()
            .iter()
            .filter(|m| m.time <= date)
            .max_by_key(|m| m.time)
            .cloned()
            .ok_or(AttnStoreError::NotFound { date })
    }

    fn measure_from_scans(&self, date: Instant) -> Result<AttenuationMeasurement, AttnStoreError> {
        self.measurable
            .clone()
            .ok_or(AttnStoreError::NoScans { date })
    }

    fn write(&self, measurement: &AttenuationMeasurement) -> Result<(), AttnStoreError> {
        if self.fail_writes {
            return Err(AttnStoreError::Store {
                message: "writes disabled".to_string(),
            });
        }
        self.stored.borrow_mut().push(measurement.clone());
        Ok(())
    }
}
