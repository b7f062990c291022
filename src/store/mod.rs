//! Interfaces to the external stores this crate reads from and writes to.
//!
//! The state-history (stateframe) database, the calibration header store, the
//! scan locator and the attenuation calibration store are all collaborators
//! owned by the caller. They are handed to [`crate::GainCalContext`] as trait
//! objects, so a deployment can back them with a database client and tests
//! can use the in-memory versions in [`memory`].

pub mod error;
pub mod memory;
pub mod query;

use std::collections::BTreeMap;

use ndarray::Array2;

pub use error::{AttnStoreError, CalHeaderError, CalKind, QueryError, ScanLocatorError};
pub use query::{Column, Order, Query, SchemaVersion, SqlStatement, Table, TimeFilter};

use crate::{
    attn_curve::AttenuationMeasurement,
    time::{Instant, TimeRange},
};

/// The values of one column of a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Integer-valued column
    Int(Vec<i64>),
    /// Float-valued column
    Float(Vec<f64>),
}

impl ColumnData {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
        }
    }

    /// Number of rows in the column.
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A query result: a mapping from column to equal-length value vectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnarResult {
    columns: BTreeMap<Column, ColumnData>,
}

impl ColumnarResult {
    /// Add or replace a column.
    pub fn insert(&mut self, column: Column, data: ColumnData) {
        self.columns.insert(column, data);
    }

    fn get(&self, column: Column) -> Result<&ColumnData, QueryError> {
        self.columns
            .get(&column)
            .ok_or(QueryError::MissingColumn { column })
    }

    /// An integer-valued column.
    ///
    /// # Errors
    ///
    /// [`QueryError::MissingColumn`] if absent, [`QueryError::ColumnType`] if
    /// the column holds floats.
    pub fn ints(&self, column: Column) -> Result<&[i64], QueryError> {
        match self.get(column)? {
            ColumnData::Int(v) => Ok(v),
            other => Err(QueryError::ColumnType {
                column,
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    /// A column as floats. Integer columns are converted.
    ///
    /// # Errors
    ///
    /// [`QueryError::MissingColumn`] if absent.
    pub fn floats(&self, column: Column) -> Result<Vec<f64>, QueryError> {
        Ok(match self.get(column)? {
            ColumnData::Int(v) => v.iter().map(|&x| x as f64).collect(),
            ColumnData::Float(v) => v.clone(),
        })
    }

    /// Number of rows, taken from the timestamp column.
    pub fn num_rows(&self) -> usize {
        self.columns
            .get(&Column::Timestamp)
            .map_or(0, ColumnData::len)
    }
}

/// An open session against the state-history store. Dropping the session
/// releases it.
pub trait TelemetrySession {
    /// The schema version tag in force at `at`.
    ///
    /// # Errors
    ///
    /// Any [`QueryError`] reported by the store.
    fn schema_version(&mut self, at: Instant) -> Result<SchemaVersion, QueryError>;

    /// Run a query.
    ///
    /// # Errors
    ///
    /// Any [`QueryError`] reported by the store.
    fn execute(&mut self, query: &Query) -> Result<ColumnarResult, QueryError>;
}

/// The state-history store.
pub trait TelemetryStore {
    /// Open a session.
    ///
    /// # Errors
    ///
    /// [`QueryError::Connection`] if the store is unreachable.
    fn open_session(&self) -> Result<Box<dyn TelemetrySession + '_>, QueryError>;
}

/// Open a session, run `f` against it, and release the session however `f`
/// returns.
pub(crate) fn with_session<T, E>(
    store: &dyn TelemetryStore,
    f: impl FnOnce(&mut dyn TelemetrySession) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<QueryError>,
{
    let mut session = store.open_session()?;
    f(session.as_mut())
}

/// The calibration header store.
pub trait CalHeaderReader {
    /// DCM attenuation (dB) in force at `at`, shaped `[band, NUM_ANTS * NUM_POLS]`
    /// with antenna-major, polarization-minor columns.
    ///
    /// # Errors
    ///
    /// [`CalHeaderError`] if no record is in force or it cannot be decoded.
    fn dcm_attenuation(&self, at: Instant) -> Result<Array2<f64>, CalHeaderError>;

    /// The time of the reference calibration in force at `at`.
    ///
    /// # Errors
    ///
    /// [`CalHeaderError`] if no record is in force or it cannot be decoded.
    fn refcal_time(&self, at: Instant) -> Result<Instant, CalHeaderError>;
}

/// Resolves the list of 1-based band numbers assigned to each DCM slot.
pub trait BandListResolver {
    /// The band list in force at `at`, or `None` if it cannot be determined.
    fn active_band_list(&self, at: Instant) -> Option<Vec<usize>>;
}

/// Locates recorded scans by time.
pub trait ScanLocator {
    /// Names of the phase-calibration scans that start within `range`, in
    /// chronological order. Names follow the `IDByyyymmddhhmmss` pattern.
    ///
    /// # Errors
    ///
    /// [`ScanLocatorError`] if the scan index cannot be read.
    fn find_scans(&self, range: TimeRange) -> Result<Vec<String>, ScanLocatorError>;
}

/// Stores and produces FEM attenuation measurements.
pub trait AttnCalStore {
    /// The most recent stored measurement on or before `date`.
    ///
    /// # Errors
    ///
    /// [`AttnStoreError::NotFound`] if nothing is stored.
    fn read_stored(&self, date: Instant) -> Result<AttenuationMeasurement, AttnStoreError>;

    /// Measure attenuations afresh from the day's GAINCALTEST scans.
    ///
    /// # Errors
    ///
    /// [`AttnStoreError::NoScans`] if there is nothing to measure from.
    fn measure_from_scans(&self, date: Instant) -> Result<AttenuationMeasurement, AttnStoreError>;

    /// Persist a measurement.
    ///
    /// # Errors
    ///
    /// [`AttnStoreError::Store`] if the write fails.
    fn write(&self, measurement: &AttenuationMeasurement) -> Result<(), AttnStoreError>;
}
