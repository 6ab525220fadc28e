//! Growing and truncating the frame and integration axes of a ramp.
//!
//! Dark current accumulates along an integration, so frames appended to a
//! ramp carry a running offset: each appended block starts from the last
//! frame of the sequence built so far. Integrations are independent
//! exposures and are duplicated without any offset.

use ndarray::{concatenate, s, Array, Array4, Axis, RemoveAxis, Slice};

use super::RampCube;
use crate::error::{DarkPrepError, Result};

/// Make the frame axis exactly `required` frames long.
///
/// Short ramps are extended by appending copies of the original frames,
/// offset by the last frame of the current sequence; when less than a full
/// copy is needed, only the leading frame differences are appended. Long
/// ramps are truncated. `sb_and_refpix` follows the same rule independently.
/// Header `NGROUPS` records the resulting frame count.
pub fn extend_frames(mut cube: RampCube, required: usize) -> Result<RampCube> {
    let available = cube.data.len_of(Axis(1));
    if available == 0 || required == 0 {
        return Err(DarkPrepError::Shape(format!(
            "cannot resize a {available}-frame ramp to {required} frames"
        )));
    }

    if required > available {
        log::warn!(
            "Not enough frames in the input integration: have {available}, need {required}. \
             Appending {} frames built from copies of the input.",
            required - available
        );
        cube.data = extend_frame_axis(&cube.data, required)?;
        if let Some(sb) = cube.sb_and_refpix.take() {
            cube.sb_and_refpix = Some(extend_frame_axis(&sb, required)?);
        }
    } else if required < available {
        log::info!("Truncating input ramp from {available} to {required} frames");
        cube.data = cube.data.slice(s![.., ..required, .., ..]).to_owned();
        if let Some(sb) = cube.sb_and_refpix.take() {
            cube.sb_and_refpix = Some(sb.slice(s![.., ..required, .., ..]).to_owned());
        }
    }

    cube.header.ngroups = required;
    Ok(cube)
}

/// Make the integration axis exactly `required` integrations long.
///
/// Extra integrations are full copies of the input stack followed by a
/// partial copy of the leading integrations. Data, `sb_and_refpix`, and the
/// zero-frame are all resized the same way.
pub fn extend_integrations(mut cube: RampCube, required: usize) -> Result<RampCube> {
    let available = cube.nints();
    if required > available {
        log::warn!(
            "Requested output has {required} integrations, while input dark has only {available}. \
             Adding integrations by making copies of the input."
        );
    } else {
        log::info!("{required} output integrations requested");
    }

    cube.data = resize_integrations(&cube.data, required)?;
    if let Some(sb) = cube.sb_and_refpix.take() {
        cube.sb_and_refpix = Some(resize_integrations(&sb, required)?);
    }
    if let Some(zero) = cube.zeroframe.take() {
        cube.zeroframe = Some(resize_integrations(&zero, required)?);
    }

    cube.header.nints = required;
    Ok(cube)
}

fn extend_frame_axis(original: &Array4<f64>, required: usize) -> Result<Array4<f64>> {
    let frames = original.len_of(Axis(1));
    let full_copies = required / frames;
    let remainder = required % frames;

    let mut blocks = vec![original.clone()];
    let mut last = original.index_axis(Axis(1), frames - 1).to_owned();

    for _ in 1..full_copies {
        let block = original + &last.view().insert_axis(Axis(1));
        last = block.index_axis(Axis(1), frames - 1).to_owned();
        blocks.push(block);
    }

    if remainder > 0 {
        let first = original.index_axis(Axis(1), 0).insert_axis(Axis(1));
        let steps = &original.slice(s![.., 1..=remainder, .., ..]) - &first;
        blocks.push(steps + &last.view().insert_axis(Axis(1)));
    }

    let views: Vec<_> = blocks.iter().map(|block| block.view()).collect();
    concatenate(Axis(1), &views).map_err(|e| DarkPrepError::Shape(e.to_string()))
}

fn resize_integrations<D: RemoveAxis>(
    array: &Array<f64, D>,
    required: usize,
) -> Result<Array<f64, D>> {
    let available = array.len_of(Axis(0));
    if available == 0 || required == 0 {
        return Err(DarkPrepError::Shape(format!(
            "cannot resize {available} integrations to {required}"
        )));
    }

    if required <= available {
        return Ok(array
            .slice_axis(Axis(0), Slice::from(0..required))
            .to_owned());
    }

    let full_copies = (required - available) / available;
    let remainder = (required - available) % available;

    let mut views = vec![array.view(); full_copies + 1];
    if remainder > 0 {
        views.push(array.slice_axis(Axis(0), Slice::from(0..remainder)));
    }

    concatenate(Axis(0), &views).map_err(|e| DarkPrepError::Shape(e.to_string()))
}
