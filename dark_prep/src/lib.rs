//! Dark current ramp preparation.
//!
//! Takes a dark exposure of arbitrary size and readout cadence and reshapes
//! it into a ramp matching a requested exposure: number of integrations,
//! groups, frames per group, skipped frames and subarray. Raw darks are
//! linearized through an external calibration pipeline; the superbias and
//! reference-pixel signal removed on the way is kept so raw-like ramps can be
//! rebuilt later.
//!
//! The main entry points are [`config::ParamFile`] for reading a parameter
//! file and [`prep::DarkPrep`] for running the preparation.

pub mod calibration;
pub mod config;
pub mod error;
pub mod io;
pub mod prep;
pub mod ramp;
pub mod readout;
pub mod subarray;

pub use config::{ParamFile, PrepConfig};
pub use error::{DarkPrepError, ErrorCategory, Result};
pub use prep::{DarkPrep, InputKind, PreparedDark};
pub use ramp::{RampCube, RampHeader};
