//! Subarray cropping.

use ndarray::{Array, Axis, Dimension, Slice};

use super::RampCube;
use crate::error::{DarkPrepError, Result};

/// Inclusive pixel bounds of a subarray, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubarrayBounds {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

impl SubarrayBounds {
    pub fn new(x_min: usize, y_min: usize, x_max: usize, y_max: usize) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Bounds covering a whole `rows` x `cols` frame.
    pub fn full_frame(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, cols.saturating_sub(1), rows.saturating_sub(1))
    }

    /// Width along the fast (column) axis.
    pub fn width(&self) -> usize {
        self.x_max + 1 - self.x_min
    }

    pub fn height(&self) -> usize {
        self.y_max + 1 - self.y_min
    }

    pub fn is_full_frame(&self, rows: usize, cols: usize) -> bool {
        *self == Self::full_frame(rows, cols)
    }

    fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.x_min, self.y_min, self.x_max, self.y_max)
    }
}

/// Number of detector output amplifiers used for readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmplifierCount {
    One,
    Four,
}

impl TryFrom<u32> for AmplifierCount {
    type Error = DarkPrepError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(AmplifierCount::One),
            4 => Ok(AmplifierCount::Four),
            other => Err(DarkPrepError::UnsupportedAmplifierCount(other)),
        }
    }
}

impl From<AmplifierCount> for u32 {
    fn from(amps: AmplifierCount) -> u32 {
        match amps {
            AmplifierCount::One => 1,
            AmplifierCount::Four => 4,
        }
    }
}

/// Crop the trailing (row, column) axes of `array` to `bounds`.
///
/// Works for 2-D, 3-D and 4-D arrays. Full-frame bounds return a copy of the
/// input unchanged.
pub fn crop_trailing<D: Dimension>(
    array: &Array<f64, D>,
    bounds: &SubarrayBounds,
) -> Result<Array<f64, D>> {
    let ndim = array.ndim();
    if ndim < 2 {
        return Err(DarkPrepError::Shape(format!(
            "cannot crop a {ndim}-dimensional array"
        )));
    }
    let (row_axis, col_axis) = (Axis(ndim - 2), Axis(ndim - 1));
    let (rows, cols) = (array.len_of(row_axis), array.len_of(col_axis));

    if bounds.x_min > bounds.x_max
        || bounds.y_min > bounds.y_max
        || bounds.x_max >= cols
        || bounds.y_max >= rows
    {
        return Err(DarkPrepError::BoundsOutsideFrame {
            bounds: bounds.as_tuple(),
            rows,
            cols,
        });
    }

    if bounds.is_full_frame(rows, cols) {
        return Ok(array.clone());
    }

    let cropped = array
        .slice_axis(row_axis, Slice::from(bounds.y_min..=bounds.y_max))
        .slice_axis(col_axis, Slice::from(bounds.x_min..=bounds.x_max))
        .to_owned();
    Ok(cropped)
}

/// Crop every array of `cube` to `bounds` and check amplifier alignment.
pub fn crop_cube(
    mut cube: RampCube,
    bounds: &SubarrayBounds,
    amplifiers: AmplifierCount,
) -> Result<RampCube> {
    let (rows, cols) = cube.frame_shape();
    if !bounds.is_full_frame(rows, cols) {
        log::info!(
            "Cropping {rows}x{cols} frames to subarray x {}..={}, y {}..={}",
            bounds.x_min,
            bounds.x_max,
            bounds.y_min,
            bounds.y_max
        );
    }

    cube.data = crop_trailing(&cube.data, bounds)?;
    if let Some(sb) = cube.sb_and_refpix.take() {
        cube.sb_and_refpix = Some(crop_trailing(&sb, bounds)?);
    }
    if let Some(zero) = cube.zeroframe.take() {
        cube.zeroframe = Some(crop_trailing(&zero, bounds)?);
    }

    check_amplifier_alignment(bounds, amplifiers)?;
    Ok(cube)
}

/// Four-amplifier readout splits the fast axis into equal stripes.
pub fn check_amplifier_alignment(bounds: &SubarrayBounds, amplifiers: AmplifierCount) -> Result<()> {
    let width = bounds.width();
    if amplifiers == AmplifierCount::Four && width % 4 != 0 {
        return Err(DarkPrepError::AmplifierAlignment(width));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::ramp::test_cubes::indexed_cube;
    use ndarray::{s, Array2, Array3};

    #[test]
    fn test_crop_4d_scenario() {
        // 2048x2048 is overkill for a unit test; crop a 16x16 frame instead
        let cube = indexed_cube(1, 2, 16, 16);
        let original = cube.data.clone();
        let bounds = SubarrayBounds::new(4, 2, 11, 9);

        let cropped = crop_cube(cube, &bounds, AmplifierCount::Four).unwrap();
        assert_eq!(cropped.data.dim(), (1, 2, 8, 8));
        assert_eq!(cropped.data, original.slice(s![.., .., 2..=9, 4..=11]));
    }

    #[test]
    fn test_crop_applies_to_all_ranks() {
        let bounds = SubarrayBounds::new(1, 0, 2, 1);

        let plane = Array2::from_shape_fn((3, 4), |(y, x)| (y * 10 + x) as f64);
        let cropped = crop_trailing(&plane, &bounds).unwrap();
        assert_eq!(cropped, plane.slice(s![0..=1, 1..=2]));

        let stack = Array3::from_shape_fn((2, 3, 4), |(i, y, x)| (i * 100 + y * 10 + x) as f64);
        let cropped = crop_trailing(&stack, &bounds).unwrap();
        assert_eq!(cropped.dim(), (2, 2, 2));
        assert_eq!(cropped[[1, 1, 1]], 112.0);
    }

    #[test]
    fn test_full_frame_is_noop() {
        let mut cube = indexed_cube(2, 3, 4, 8);
        cube.zeroframe = Some(cube.data.index_axis(Axis(1), 0).to_owned());
        let before = cube.clone();

        let cropped = crop_cube(cube, &SubarrayBounds::full_frame(4, 8), AmplifierCount::Four)
            .unwrap();
        assert_eq!(cropped, before);
    }

    #[test]
    fn test_companions_are_cropped() {
        let mut cube = indexed_cube(2, 3, 6, 6);
        cube.sb_and_refpix = Some(cube.data.mapv(|v| v * 2.0));
        cube.zeroframe = Some(cube.data.index_axis(Axis(1), 0).to_owned());

        let cropped = crop_cube(cube, &SubarrayBounds::new(1, 1, 4, 3), AmplifierCount::One)
            .unwrap();
        assert_eq!(cropped.sb_and_refpix.as_ref().unwrap().dim(), (2, 3, 3, 4));
        assert_eq!(cropped.zeroframe.as_ref().unwrap().dim(), (2, 3, 4));
        cropped.check_invariants().unwrap();
    }

    #[test]
    fn test_four_amp_misalignment_rejected() {
        let cube = indexed_cube(1, 1, 8, 8);
        let err = crop_cube(cube, &SubarrayBounds::new(0, 0, 5, 3), AmplifierCount::Four)
            .unwrap_err();
        assert!(matches!(err, DarkPrepError::AmplifierAlignment(6)));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_single_amp_any_width() {
        let cube = indexed_cube(1, 1, 8, 8);
        let cropped = crop_cube(cube, &SubarrayBounds::new(0, 0, 5, 3), AmplifierCount::One)
            .unwrap();
        assert_eq!(cropped.frame_shape(), (4, 6));
    }

    #[test]
    fn test_bounds_outside_frame_rejected() {
        let cube = indexed_cube(1, 1, 8, 8);
        let err = crop_cube(cube, &SubarrayBounds::new(0, 0, 8, 3), AmplifierCount::One)
            .unwrap_err();
        assert!(matches!(err, DarkPrepError::BoundsOutsideFrame { cols: 8, .. }));
    }

    #[test]
    fn test_amplifier_count_parsing() {
        assert_eq!(AmplifierCount::try_from(1).unwrap(), AmplifierCount::One);
        assert_eq!(AmplifierCount::try_from(4).unwrap(), AmplifierCount::Four);
        assert!(matches!(
            AmplifierCount::try_from(2),
            Err(DarkPrepError::UnsupportedAmplifierCount(2))
        ));
        assert_eq!(u32::from(AmplifierCount::Four), 4);
    }
}
