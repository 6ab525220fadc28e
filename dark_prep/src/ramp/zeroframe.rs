//! Zero-frame bookkeeping.
//!
//! The zero-frame is the first read of each integration. Group averaging
//! destroys it, so it is captured from RAPID-family data before any
//! averaging and carried alongside the ramp. Linearization treats it as a
//! one-group ramp so that it receives exactly the same corrections as every
//! other read.

use ndarray::{Array3, Axis};

use super::{RampCube, RampHeader};
use crate::readout::is_rapid;

/// Zero-frame and its `sb_and_refpix` companion for a cube about to be
/// averaged.
///
/// A zero-frame already attached to the cube is never replaced. Its
/// companion is only derivable from RAPID-family data, where frame 0 is the
/// zero read.
pub fn capture(dark: &RampCube) -> (Option<Array3<f64>>, Option<Array3<f64>>) {
    let rapid = is_rapid(&dark.header.readpatt);
    let first_sb = || {
        dark.sb_and_refpix
            .as_ref()
            .map(|sb| sb.index_axis(Axis(1), 0).to_owned())
    };

    match (&dark.zeroframe, rapid) {
        (None, true) => {
            log::info!("Saving 0th frame from data to the zeroframe extension");
            (Some(dark.data.index_axis(Axis(1), 0).to_owned()), first_sb())
        }
        (Some(zero), true) => (Some(zero.clone()), first_sb()),
        (None, false) => {
            log::warn!(
                "Unable to save the zeroth frame because the input dark current ramp is {}, not RAPID",
                dark.header.readpatt
            );
            (None, None)
        }
        (Some(zero), false) => (Some(zero.clone()), None),
    }
}

/// Wrap a zero-frame as a single-group ramp sharing `header`'s metadata.
pub fn as_single_group(zeroframe: &Array3<f64>, header: &RampHeader) -> RampCube {
    let mut header = header.clone();
    header.ngroups = 1;
    header.nints = zeroframe.len_of(Axis(0));
    RampCube::new(zeroframe.clone().insert_axis(Axis(1)), header)
}

/// First group of a ramp and of its `sb_and_refpix`, as 3-D arrays.
pub fn first_group(cube: &RampCube) -> (Array3<f64>, Option<Array3<f64>>) {
    (
        cube.data.index_axis(Axis(1), 0).to_owned(),
        cube.sb_and_refpix
            .as_ref()
            .map(|sb| sb.index_axis(Axis(1), 0).to_owned()),
    )
}
