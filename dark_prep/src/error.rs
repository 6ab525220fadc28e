//! Error types for dark ramp preparation.
//!
//! Every failure aborts preparation of the exposure. Errors fall in two
//! categories: configuration errors (the request itself is invalid or
//! unphysical) and resource errors (files, headers, data or external steps).

use std::path::PathBuf;
use thiserror::Error;

use crate::calibration::StepKind;

/// Broad classification of a [`DarkPrepError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid or incompatible request, never retryable
    Configuration,
    /// Missing/unreadable input, bad data, or a failed external step
    Resource,
}

/// Errors raised while preparing a dark ramp.
#[derive(Error, Debug)]
pub enum DarkPrepError {
    #[error("amplifier count {0} is not allowed (must be 1 or 4)")]
    UnsupportedAmplifierCount(u32),

    #[error("4 amplifier mode specified but the fast-axis width ({0} pixels) is not a multiple of 4")]
    AmplifierAlignment(usize),

    #[error("readout pattern '{0}' is not defined in the readout pattern table")]
    UnknownReadoutPattern(String),

    #[error("cannot transform input {input} integration into output {requested} integration; only RAPID, NISRAPID or FGSRAPID inputs can be translated")]
    IncompatibleReadout { input: String, requested: String },

    #[error("invalid readout request: {0}")]
    InvalidReadout(String),

    #[error("subarray '{0}' is not defined")]
    UnknownSubarray(String),

    #[error("subarray bounds {bounds:?} fall outside a {rows}x{cols} frame")]
    BoundsOutsideFrame {
        bounds: (usize, usize, usize, usize),
        rows: usize,
        cols: usize,
    },

    #[error("calibration steps out of order: {0}")]
    StepOrder(String),

    #[error("unsupported preparation mode: {0}")]
    UnsupportedMode(String),

    #[error("unable to locate the {what} input file: {path}")]
    MissingFile { what: String, path: PathBuf },

    #[error("{0} pipeline step configuration file not provided")]
    MissingStepConfig(StepKind),

    #[error("range of data values in the input dark ({0}) is too large for raw ADU (max 65535)")]
    RawRangeExceeded(f64),

    #[error("header keyword '{0}' missing or of the wrong type")]
    MissingHeaderKey(String),

    #[error("array shape error: {0}")]
    Shape(String),

    #[error("{step} step failed: {message}")]
    Step { step: StepKind, message: String },

    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::compat::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parameter file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DarkPrepError {
    /// Which side of the taxonomy this error falls on.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DarkPrepError::UnsupportedAmplifierCount(_)
            | DarkPrepError::AmplifierAlignment(_)
            | DarkPrepError::UnknownReadoutPattern(_)
            | DarkPrepError::IncompatibleReadout { .. }
            | DarkPrepError::InvalidReadout(_)
            | DarkPrepError::UnknownSubarray(_)
            | DarkPrepError::BoundsOutsideFrame { .. }
            | DarkPrepError::StepOrder(_)
            | DarkPrepError::UnsupportedMode(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, DarkPrepError>;
