//! Detector ramp cubes and the transformations that reshape them.
//!
//! A ramp is a 4-D array indexed `(integration, group, row, column)`. The
//! submodules implement each reshaping stage:
//!
//! - [`extend`]: grow or truncate the frame and integration axes
//! - [`translate`]: convert RAPID-family data into another readout cadence
//! - [`crop`]: cut the trailing pixel axes down to a subarray
//! - [`zeroframe`]: helpers for carrying the first read of each integration

pub mod crop;
pub mod extend;
pub mod translate;
pub mod zeroframe;

use ndarray::{Array3, Array4};

use crate::error::{DarkPrepError, Result};

pub use crop::{crop_cube, AmplifierCount, SubarrayBounds};
pub use extend::{extend_frames, extend_integrations};
pub use translate::{translate_readout, Translated};

/// Readout metadata carried alongside a ramp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampHeader {
    /// Readout pattern name
    pub readpatt: String,
    /// Frames averaged per group
    pub nframes: usize,
    /// Frames skipped between groups
    pub nskip: usize,
    /// Groups per integration (frames, right after frame extension)
    pub ngroups: usize,
    /// Integrations in the exposure
    pub nints: usize,
    pub detector: String,
    pub instrument: String,
    /// Fast readout axis orientation (±1 or ±2)
    pub fastaxis: i64,
    /// Slow readout axis orientation (±1 or ±2)
    pub slowaxis: i64,
}

impl RampHeader {
    /// Header for a RAPID exposure of the given size, used for synthetic cubes.
    pub fn rapid(nints: usize, ngroups: usize) -> Self {
        Self {
            readpatt: "RAPID".to_string(),
            nframes: 1,
            nskip: 0,
            ngroups,
            nints,
            detector: String::new(),
            instrument: String::new(),
            fastaxis: 1,
            slowaxis: 2,
        }
    }
}

/// A detector exposure with its optional companion arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct RampCube {
    /// Samples in detector counts, `(nint, ngroup, rows, cols)`
    pub data: Array4<f64>,
    /// Superbias and reference-pixel signal removed during linearization
    pub sb_and_refpix: Option<Array4<f64>>,
    /// First read of each integration, `(nint, rows, cols)`
    pub zeroframe: Option<Array3<f64>>,
    pub header: RampHeader,
}

impl RampCube {
    /// Build a cube with no companion arrays.
    pub fn new(data: Array4<f64>, header: RampHeader) -> Self {
        Self {
            data,
            sb_and_refpix: None,
            zeroframe: None,
            header,
        }
    }

    pub fn nints(&self) -> usize {
        self.data.dim().0
    }

    pub fn ngroups(&self) -> usize {
        self.data.dim().1
    }

    /// Pixel dimensions as (rows, cols).
    pub fn frame_shape(&self) -> (usize, usize) {
        let (_, _, rows, cols) = self.data.dim();
        (rows, cols)
    }

    /// Verify the shape invariants between data, companions, and header.
    pub fn check_invariants(&self) -> Result<()> {
        let (nint, ngroup, rows, cols) = self.data.dim();

        if ngroup != self.header.ngroups {
            return Err(DarkPrepError::Shape(format!(
                "data holds {ngroup} groups but header NGROUPS is {}",
                self.header.ngroups
            )));
        }

        if let Some(sb) = &self.sb_and_refpix {
            if sb.dim() != self.data.dim() {
                return Err(DarkPrepError::Shape(format!(
                    "sbAndRefpix shape {:?} does not match data shape {:?}",
                    sb.shape(),
                    self.data.shape()
                )));
            }
        }

        if let Some(zero) = &self.zeroframe {
            if zero.dim() != (nint, rows, cols) {
                return Err(DarkPrepError::Shape(format!(
                    "zeroframe shape {:?} does not match ({nint}, {rows}, {cols})",
                    zero.shape()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_cubes {
    //! Deterministic cubes for unit tests.

    use super::*;

    /// Every sample encodes its own position so reshapes are easy to trace.
    pub fn indexed_cube(nint: usize, nframe: usize, rows: usize, cols: usize) -> RampCube {
        let data = Array4::from_shape_fn((nint, nframe, rows, cols), |(i, f, y, x)| {
            (i * 1000 + f * 100 + y * 10 + x) as f64
        });
        RampCube::new(data, RampHeader::rapid(nint, nframe))
    }
}

#[cfg(test)]
mod tests {
    use super::test_cubes::indexed_cube;
    use super::*;

    #[test]
    fn test_fresh_cube_is_consistent() {
        let cube = indexed_cube(2, 5, 4, 4);
        assert_eq!(cube.nints(), 2);
        assert_eq!(cube.ngroups(), 5);
        assert_eq!(cube.frame_shape(), (4, 4));
        cube.check_invariants().unwrap();
    }

    #[test]
    fn test_header_group_mismatch_detected() {
        let mut cube = indexed_cube(1, 5, 2, 2);
        cube.header.ngroups = 4;
        assert!(matches!(
            cube.check_invariants(),
            Err(DarkPrepError::Shape(_))
        ));
    }

    #[test]
    fn test_companion_shape_mismatch_detected() {
        let mut cube = indexed_cube(2, 3, 2, 2);
        cube.sb_and_refpix = Some(Array4::zeros((2, 2, 2, 2)));
        assert!(cube.check_invariants().is_err());

        let mut cube = indexed_cube(2, 3, 2, 2);
        cube.zeroframe = Some(Array3::zeros((1, 2, 2)));
        assert!(cube.check_invariants().is_err());
    }
}
