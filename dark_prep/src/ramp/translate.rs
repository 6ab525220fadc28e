//! Readout-pattern translation.
//!
//! A RAPID-family ramp keeps every frame, so any other cadence can be built
//! from it by averaging `nframe` frames per group and dropping `nskip` frames
//! between groups. A ramp that already has the requested pattern is passed
//! through. Every other combination is unphysical and rejected.

use ndarray::{s, Array3, Array4, ArrayView4, Axis};

use super::zeroframe;
use super::RampCube;
use crate::error::{DarkPrepError, Result};
use crate::readout::{is_rapid, same_pattern, ReadoutRequest};

/// Result of a readout translation.
#[derive(Debug, Clone)]
pub struct Translated {
    /// The cube at the requested cadence
    pub cube: RampCube,
    /// `sb_and_refpix` of the zero-frame, when it can be recovered
    pub zero_sb_and_refpix: Option<Array3<f64>>,
}

/// Reshape `dark` into the cadence described by `request`.
///
/// The input is left untouched; on error nothing has been computed. The
/// cube's companion arrays must match its data shape, and it must already
/// hold at least `request.nint` integrations and
/// `request.frames_required()` frames (see [`super::extend`]).
pub fn translate_readout(dark: &RampCube, request: &ReadoutRequest) -> Result<Translated> {
    dark.check_invariants()?;

    let input_pattern = dark.header.readpatt.as_str();
    let input_rapid = is_rapid(input_pattern);
    let passthrough = same_pattern(input_pattern, &request.readpatt);

    if !passthrough && !(input_rapid && !request.is_rapid()) {
        return Err(DarkPrepError::IncompatibleReadout {
            input: input_pattern.to_uppercase(),
            requested: request.readpatt.clone(),
        });
    }

    let (nint, nframes, _, _) = dark.data.dim();
    let frames_needed = if passthrough {
        request.ngroup
    } else {
        request.frames_required()
    };
    if nint < request.nint || nframes < frames_needed {
        return Err(DarkPrepError::Shape(format!(
            "ramp of {nint} integrations x {nframes} frames is too small for \
             {} integrations x {frames_needed} frames",
            request.nint
        )));
    }

    let (zeroframe, zero_sb_and_refpix) = zeroframe::capture(dark);

    let (data, sb_and_refpix) = if passthrough {
        let (nint, ngroup) = (request.nint, request.ngroup);
        (
            dark.data.slice(s![..nint, ..ngroup, .., ..]).to_owned(),
            dark.sb_and_refpix
                .as_ref()
                .map(|sb| sb.slice(s![..nint, ..ngroup, .., ..]).to_owned()),
        )
    } else {
        (
            average_groups(dark.data.view(), request)?,
            dark.sb_and_refpix
                .as_ref()
                .map(|sb| average_groups(sb.view(), request))
                .transpose()?,
        )
    };

    log::info!(
        "Dark reordered from {} {:?} to {} {:?}",
        input_pattern,
        dark.data.shape(),
        request.readpatt,
        data.shape()
    );

    let mut header = dark.header.clone();
    header.readpatt = request.readpatt.clone();
    header.nframes = request.nframe;
    header.nskip = request.nskip;
    header.ngroups = request.ngroup;
    header.nints = request.nint;

    let zeroframe = zeroframe.map(|zero| zero.slice(s![..request.nint, .., ..]).to_owned());
    let zero_sb_and_refpix =
        zero_sb_and_refpix.map(|zero| zero.slice(s![..request.nint, .., ..]).to_owned());

    Ok(Translated {
        cube: RampCube {
            data,
            sb_and_refpix,
            zeroframe,
            header,
        },
        zero_sb_and_refpix,
    })
}

/// Average `nframe` frames into each group, skipping `nskip` frames between.
fn average_groups(frames: ArrayView4<f64>, request: &ReadoutRequest) -> Result<Array4<f64>> {
    let (_, _, rows, cols) = frames.dim();
    let stride = request.nframe + request.nskip;
    let mut out = Array4::<f64>::zeros((request.nint, request.ngroup, rows, cols));

    for integ in 0..request.nint {
        for group in 0..request.ngroup {
            let start = group * stride;
            let selected = frames.slice(s![integ, start..start + request.nframe, .., ..]);
            log::debug!(
                "Averaging frames {}..{} of integration {} into group {}",
                start,
                start + request.nframe,
                integ,
                group
            );

            let mut target = out.slice_mut(s![integ, group, .., ..]);
            if request.nframe > 1 {
                let mean = selected.mean_axis(Axis(0)).ok_or_else(|| {
                    DarkPrepError::Shape(format!("no frames to average for group {group}"))
                })?;
                target.assign(&mean);
            } else {
                target.assign(&selected.index_axis(Axis(0), 0));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ramp::test_cubes::indexed_cube;
    use approx::assert_relative_eq;

    fn request(
        readpatt: &str,
        nframe: usize,
        nskip: usize,
        ngroup: usize,
        nint: usize,
    ) -> ReadoutRequest {
        ReadoutRequest::new(readpatt, nframe, nskip, ngroup, nint).unwrap()
    }

    #[test]
    fn test_rapid_to_averaged_groups() {
        // 2 integrations x 10 frames, nframe=2 nskip=1 ngroup=3
        let dark = indexed_cube(2, 10, 4, 4);
        let translated = translate_readout(&dark, &request("SHALLOW2", 2, 1, 3, 2)).unwrap();
        let out = &translated.cube.data;
        assert_eq!(out.dim(), (2, 3, 4, 4));

        for integ in 0..2 {
            for (group, first) in [(0usize, 0usize), (1, 3), (2, 6)] {
                let expected = (&dark.data.slice(s![integ, first, .., ..])
                    + &dark.data.slice(s![integ, first + 1, .., ..]))
                    / 2.0;
                assert_eq!(out.slice(s![integ, group, .., ..]), expected);
            }
        }

        let header = &translated.cube.header;
        assert_eq!(header.readpatt, "SHALLOW2");
        assert_eq!(header.nframes, 2);
        assert_eq!(header.nskip, 1);
        assert_eq!(header.ngroups, 3);
        assert_eq!(header.nints, 2);
        translated.cube.check_invariants().unwrap();
    }

    #[test]
    fn test_single_frame_groups_equal_cropping() {
        let dark = indexed_cube(1, 8, 3, 3);
        let translated = translate_readout(&dark, &request("CUSTOM1", 1, 0, 5, 1)).unwrap();
        assert_eq!(translated.cube.data, dark.data.slice(s![.., ..5, .., ..]));
    }

    #[test]
    fn test_sb_and_refpix_averaged_in_float() {
        let mut dark = indexed_cube(1, 4, 2, 2);
        dark.sb_and_refpix = Some(Array4::from_shape_fn((1, 4, 2, 2), |(_, f, _, _)| f as f64));

        let translated = translate_readout(&dark, &request("BRIGHT2", 2, 0, 2, 1)).unwrap();
        let sb = translated.cube.sb_and_refpix.unwrap();
        assert_relative_eq!(sb[[0, 0, 1, 1]], 0.5);
        assert_relative_eq!(sb[[0, 1, 0, 0]], 2.5);
    }

    #[test]
    fn test_matching_pattern_passes_through() {
        let mut dark = indexed_cube(2, 6, 2, 2);
        dark.header.readpatt = "DEEP8".to_string();
        dark.header.nframes = 8;
        dark.header.nskip = 12;

        let translated = translate_readout(&dark, &request("deep8", 8, 12, 4, 2)).unwrap();
        assert_eq!(translated.cube.data, dark.data.slice(s![.., ..4, .., ..]));
        assert_eq!(translated.cube.header.readpatt, "DEEP8");
        assert_eq!(translated.cube.header.ngroups, 4);
        // Non-RAPID input without a zero-frame cannot recover one
        assert!(translated.cube.zeroframe.is_none());
        assert!(translated.zero_sb_and_refpix.is_none());
    }

    #[test]
    fn test_incompatible_patterns_rejected_without_mutation() {
        let mut dark = indexed_cube(1, 6, 2, 2);
        dark.header.readpatt = "DEEP8".to_string();
        let before = dark.clone();

        let err = translate_readout(&dark, &request("BRIGHT2", 2, 0, 2, 1)).unwrap_err();
        assert!(matches!(err, DarkPrepError::IncompatibleReadout { .. }));
        assert_eq!(dark, before);
    }

    #[test]
    fn test_rapid_zero_frame_captured_before_averaging() {
        let mut dark = indexed_cube(2, 6, 2, 2);
        dark.sb_and_refpix = Some(dark.data.mapv(|v| v * 0.1));

        let translated = translate_readout(&dark, &request("BRIGHT2", 2, 0, 3, 2)).unwrap();
        let zero = translated.cube.zeroframe.as_ref().unwrap();
        assert_eq!(zero, &dark.data.index_axis(Axis(1), 0));

        let zero_sb = translated.zero_sb_and_refpix.unwrap();
        assert_eq!(
            zero_sb,
            dark.sb_and_refpix.as_ref().unwrap().index_axis(Axis(1), 0)
        );
    }

    #[test]
    fn test_existing_zero_frame_is_kept() {
        let mut dark = indexed_cube(1, 4, 2, 2);
        let supplied = Array3::from_elem((1, 2, 2), -7.0);
        dark.zeroframe = Some(supplied.clone());

        let translated = translate_readout(&dark, &request("BRIGHT2", 2, 0, 2, 1)).unwrap();
        assert_eq!(translated.cube.zeroframe.unwrap(), supplied);
        // No sb_and_refpix in the input, so there is nothing to derive
        assert!(translated.zero_sb_and_refpix.is_none());
    }

    #[test]
    fn test_too_few_frames_is_shape_error() {
        let dark = indexed_cube(1, 4, 2, 2);
        let err = translate_readout(&dark, &request("SHALLOW2", 2, 3, 2, 1)).unwrap_err();
        assert!(matches!(err, DarkPrepError::Shape(_)));
    }

    #[test]
    fn test_short_zero_frame_is_shape_error() {
        let mut dark = indexed_cube(2, 4, 2, 2);
        dark.zeroframe = Some(Array3::zeros((1, 2, 2)));

        let err = translate_readout(&dark, &request("BRIGHT2", 2, 0, 2, 2)).unwrap_err();
        assert!(matches!(err, DarkPrepError::Shape(_)));
    }

    #[test]
    fn test_mismatched_sb_and_refpix_is_shape_error() {
        let mut dark = indexed_cube(2, 4, 2, 2);
        dark.sb_and_refpix = Some(Array4::zeros((1, 4, 2, 2)));

        let err = translate_readout(&dark, &request("BRIGHT2", 2, 0, 2, 2)).unwrap_err();
        assert!(matches!(err, DarkPrepError::Shape(_)));
    }
}
