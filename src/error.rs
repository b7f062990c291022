//! Errors that can occur in gaincal

use thiserror::Error;

pub use crate::store::error::{AttnStoreError, CalHeaderError, QueryError, ScanLocatorError};
use crate::time::TimeRange;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
/// An array handed to a function does not have the shape it requires.
pub struct BadArrayShape {
    /// The argument name
    pub argument: &'static str,
    /// The function name
    pub function: &'static str,
    /// The expected shape
    pub expected: String,
    /// The shape that was received
    pub received: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("source gain state has {source_bands} bands but the reference has {reference_bands}")]
/// A source and reference gain state cannot be compared.
pub struct IncompatibleStateError {
    /// Bands in the source state
    pub source_bands: usize,
    /// Bands in the reference state
    pub reference_bands: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no FEM attenuation calibration available: {reason}")]
/// No attenuation curve could be obtained for a date.
pub struct MissingCalibrationError {
    /// Why not
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no DCM band list could be resolved for {range}")]
/// The frequency sequence in force for an observation could not be resolved.
pub struct MissingBandListError {
    /// The observation time range
    pub range: TimeRange,
}

#[derive(Error, Debug)]
/// All the errors that can occur in gaincal
pub enum GaincalError {
    /// A query against the state-history store failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A calibration header could not be read.
    #[error(transparent)]
    CalHeader(#[from] CalHeaderError),

    /// The scan locator failed.
    #[error(transparent)]
    ScanLocator(#[from] ScanLocatorError),

    /// The attenuation calibration store failed.
    #[error(transparent)]
    AttnStore(#[from] AttnStoreError),

    /// An array had the wrong shape.
    #[error(transparent)]
    BadArrayShape(#[from] BadArrayShape),

    /// Telemetry could not be arranged into the expected shape.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// Source and reference states disagree on the number of bands.
    #[error(transparent)]
    IncompatibleState(#[from] IncompatibleStateError),

    /// No attenuation calibration is available.
    #[error(transparent)]
    MissingCalibration(#[from] MissingCalibrationError),

    /// No band list is available.
    #[error(transparent)]
    MissingBandList(#[from] MissingBandListError),

    /// The store held no telemetry in a time range.
    #[error("no telemetry records in {range}")]
    NoTelemetry {
        /// The range queried
        range: TimeRange,
    },

    /// Every reference strategy failed.
    #[error("no usable reference gain state: {}", reasons.join("; "))]
    NoReference {
        /// Why each strategy failed, in the order they were tried
        reasons: Vec<String>,
    },
}
