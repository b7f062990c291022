//! Errors that can occur when talking to the telemetry store

use thiserror::Error;

use super::query::Column;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// All the errors that can occur while querying the state-history store.
pub enum QueryError {
    /// The store could not be reached, or a session could not be opened.
    #[error("could not connect to the telemetry store: {message}")]
    Connection {
        /// Diagnostic from the store
        message: String,
    },

    /// The store rejected or failed to run a query. `message` is the status
    /// text returned in place of "Success".
    #[error("query against {table} failed: {message}")]
    Rejected {
        /// The table the query was against
        table: String,
        /// Diagnostic from the store
        message: String,
    },

    /// A column that was asked for is missing from the result.
    #[error("column {column:?} missing from query result")]
    MissingColumn {
        /// The missing column
        column: Column,
    },

    /// A column came back with a different element type to the one expected.
    #[error("column {column:?} holds {found} values, expected {expected}")]
    ColumnType {
        /// The offending column
        column: Column,
        /// The type that was expected
        expected: &'static str,
        /// The type that was found
        found: &'static str,
    },

    /// A schema version tag would not be safe to splice into a table name.
    #[error("invalid schema version tag {tag:?}")]
    InvalidSchemaVersion {
        /// The tag as given
        tag: String,
    },
}

/// Kinds of calibration header record this crate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalKind {
    /// Kind 2: DCM attenuation per band, antenna and polarization.
    DcmAttenuation = 2,
    /// Kind 8: time of the current reference calibration.
    RefcalTime = 8,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors reading a record from the calibration header store.
pub enum CalHeaderError {
    /// No record of this kind is in force at the requested time.
    #[error("no {kind:?} calibration header in force at {at}")]
    NotFound {
        /// The kind of record asked for
        kind: CalKind,
        /// When it was asked for
        at: crate::time::Instant,
    },

    /// A record exists but could not be decoded.
    #[error("malformed {kind:?} calibration header: {message}")]
    Malformed {
        /// The kind of record asked for
        kind: CalKind,
        /// What was wrong with it
        message: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not list scans in {range}: {message}")]
/// The scan locator failed to list scans.
pub struct ScanLocatorError {
    /// The range that was searched
    pub range: crate::time::TimeRange,
    /// Diagnostic from the locator
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors reading, measuring or writing FEM attenuation measurements.
pub enum AttnStoreError {
    /// No measurement is stored on or before the date.
    #[error("no stored attenuation measurement on or before {date}")]
    NotFound {
        /// The date asked for
        date: crate::time::Instant,
    },

    /// There are no GAINCALTEST scans to measure from.
    #[error("no GAINCALTEST scans found for {date}")]
    NoScans {
        /// The date asked for
        date: crate::time::Instant,
    },

    /// The backing store failed.
    #[error("attenuation store failure: {message}")]
    Store {
        /// Diagnostic from the store
        message: String,
    },
}
