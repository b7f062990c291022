#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! Gaincal reconstructs the attenuator state of a solar radio interferometer
//! from its state-history telemetry, and corrects correlator data for changes
//! in that state.
//!
//! # Examples
//!
//! Here's an example of correcting a record against a reference taken at its
//! own start, which leaves it unchanged.
//!
//! ```rust
//! use gaincal::{
//!     apply_gain_corr,
//!     ndarray::Array2,
//!     store::{
//!         memory::{MemoryCalHeader, MemoryTelemetry},
//!         Column, SchemaVersion,
//!     },
//!     CorrelatorData, GainCalContextBuilder, Instant,
//! };
//!
//! let t0 = Instant::from_gregorian(2017, 9, 10, 18, 0, 0);
//!
//! // a state-history store holding a minute of constant attenuator settings
//! let mut telemetry = MemoryTelemetry::new(SchemaVersion::new("66").unwrap());
//! for t in 0..60 {
//!     telemetry.push_antenna_rows(
//!         t0.add_secs(t),
//!         &[
//!             (Column::FemClockMs, [1; 15]),
//!             (Column::HPolAtteFirst, [5; 15]),
//!             (Column::HPolAtteSecond, [3; 15]),
//!             (Column::VPolAtteFirst, [5; 15]),
//!             (Column::VPolAtteSecond, [3; 15]),
//!         ],
//!     );
//! }
//!
//! // a calibration header with 34 bands of DCM attenuation
//! let cal_header = MemoryCalHeader {
//!     dcm_attn: Some(Array2::zeros((34, 30))),
//!     refcal_time: None,
//! };
//!
//! let ctx = GainCalContextBuilder::default()
//!     .telemetry(&telemetry)
//!     .cal_header(&cal_header)
//!     .build()
//!     .unwrap();
//!
//! // ten seconds of data at 1.5 and 2.5 GHz
//! let time = (0..10).map(|t| t0.add_secs(t).to_jd()).collect();
//! let data = CorrelatorData::ones(time, vec![1.5, 2.5]);
//!
//! let corrected = apply_gain_corr(&ctx, &data, Some(t0));
//! assert_eq!(corrected, data);
//! ```
//!
//! # Details
//!
//! Every operation runs against a [`GainCalContext`], which holds the
//! state-history store, the calibration header store and the optional
//! collaborators behind [`store`]'s traits. In-memory implementations of each
//! are in [`store::memory`].

pub mod attn_curve;
pub mod constants;
pub mod context;
pub mod corrections;
pub mod dcm;
pub mod error;
pub mod fem_level;
pub mod gain_corr;
pub mod gain_state;
pub mod level_corr;
pub mod reference;
pub mod resample;
pub mod store;
pub mod telemetry;
pub mod time;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_common;

pub use attn_curve::{AttenuationCurve, AttenuationMeasurement};
pub use context::{GainCalConfig, GainCalConfigBuilder, GainCalContext, GainCalContextBuilder};
pub use error::GaincalError;
pub use fem_level::{get_fem_level, FemLevelState, FemLevels};
pub use gain_corr::{apply_gain_corr, get_gain_corr, AntennaGainTable};
pub use gain_state::{get_gain_state, GainState};
pub use level_corr::apply_fem_level;
pub use reference::ReferenceStrategy;
pub use time::{Instant, TimeRange};
pub use types::{CorrelatorData, SkyCal};

pub use hifitime;
pub use ndarray;
pub use num_complex::Complex;
