//! Dark preparation driver.
//!
//! Sequences the whole preparation of one exposure:
//!
//! 1. load the raw or linearized dark
//! 2. grow/trim the frame axis to `ngroup * (nframe + nskip)` frames
//! 3. grow/trim the integration axis to `nint`
//! 4. translate into the requested readout pattern
//! 5. raw input only: linearize the ramp and its zero-frame
//! 6. crop to the requested subarray
//! 7. write the bundle

use std::path::Path;

use ndarray::{Array3, Array4};

use crate::calibration::CalibrationPipeline;
use crate::config::{DarkSource, PrepConfig};
use crate::error::{DarkPrepError, Result};
use crate::io::fits;
use crate::ramp::crop::crop_trailing;
use crate::ramp::{
    crop_cube, extend_frames, extend_integrations, translate_readout, zeroframe, RampCube,
    RampHeader,
};
use crate::readout::{is_rapid, same_pattern};

/// Largest sample range a raw 16-bit ramp can span.
pub const RAW_ADU_RANGE: f64 = 65535.0;

/// Offset turning signed 16-bit samples into unsigned ADU.
pub const SIGNED_OFFSET: f64 = 32768.0;

/// The prepared dark: the contents of the output bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDark {
    pub data: Array4<f64>,
    pub sb_and_refpix: Option<Array4<f64>>,
    pub zeroframe: Option<Array3<f64>>,
    pub zero_sb_and_refpix: Option<Array3<f64>>,
    pub header: RampHeader,
}

/// How the input dark was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Raw,
    Linearized,
}

/// Prepares darks for one validated configuration.
#[derive(Debug)]
pub struct DarkPrep {
    config: PrepConfig,
    pipeline: Option<CalibrationPipeline>,
}

impl DarkPrep {
    /// Build the driver, creating the external calibration pipeline when the
    /// configuration calls for one.
    pub fn new(config: PrepConfig) -> Result<Self> {
        let pipeline = config
            .pipeline
            .as_ref()
            .map(CalibrationPipeline::from_config)
            .transpose()?;
        Ok(Self { config, pipeline })
    }

    /// Build the driver around an already assembled pipeline.
    pub fn with_pipeline(config: PrepConfig, pipeline: CalibrationPipeline) -> Self {
        Self {
            config,
            pipeline: Some(pipeline),
        }
    }

    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Load the configured dark, prepare it and write the bundle.
    pub fn prepare(&self) -> Result<PreparedDark> {
        let (path, kind) = match &self.config.source {
            DarkSource::Raw(path) => (path, InputKind::Raw),
            DarkSource::Linearized(path) => (path, InputKind::Linearized),
        };
        let cube = fits::read_ramp(path)?;
        let prepared = self.prepare_cube(cube, kind)?;

        let bundle = self.config.bundle_path();
        fits::write_bundle(&prepared, &bundle)?;
        Ok(prepared)
    }

    /// Prepare an in-memory dark.
    pub fn prepare_cube(&self, mut dark: RampCube, kind: InputKind) -> Result<PreparedDark> {
        let request = &self.config.request;
        if kind == InputKind::Raw {
            check_raw(&mut dark, &self.config)?;
        }

        log::info!("Dark shape as read in: {:?}", dark.data.shape());
        let dark = extend_frames(dark, request.frames_required())?;
        let dark = extend_integrations(dark, request.nint)?;
        log::info!(
            "Dark shape after matching the requested integrations: {:?}",
            dark.data.shape()
        );

        let translated = translate_readout(&dark, request)?;
        let bounds = &self.config.subarray.bounds;
        let amplifiers = self.config.subarray.amplifiers;

        let (linear, zeroframe, zero_sb_and_refpix) = match kind {
            InputKind::Raw => {
                let pipeline = self.pipeline.as_ref().ok_or_else(|| {
                    DarkPrepError::UnsupportedMode(
                        "a raw dark cannot be prepared without the calibration pipeline"
                            .to_string(),
                    )
                })?;
                let persist = self.config.linearized_path();
                self.linearize(pipeline, translated.cube, &persist)?
            }
            InputKind::Linearized => {
                let cube = translated.cube;
                let zeroframe = cube.zeroframe.clone();
                if cube.sb_and_refpix.is_none() {
                    log::warn!("Linearized dark has no SBANDREFPIX extension");
                }
                (cube, zeroframe, translated.zero_sb_and_refpix)
            }
        };

        let linear = crop_cube(linear, bounds, amplifiers)?;
        let zeroframe = zeroframe
            .map(|zero| crop_trailing(&zero, bounds))
            .transpose()?;
        let zero_sb_and_refpix = zero_sb_and_refpix
            .map(|zero| crop_trailing(&zero, bounds))
            .transpose()?;

        let mut header = linear.header.clone();
        header.readpatt = request.readpatt.clone();
        header.nframes = request.nframe;
        header.nskip = request.nskip;
        header.ngroups = linear.ngroups();
        header.nints = linear.nints();

        log::info!(
            "Prepared {} dark {:?}, zero-frame {}",
            header.readpatt,
            linear.data.shape(),
            if zeroframe.is_some() { "present" } else { "absent" }
        );

        Ok(PreparedDark {
            data: linear.data,
            sb_and_refpix: linear.sb_and_refpix,
            zeroframe,
            zero_sb_and_refpix,
            header,
        })
    }

    /// Linearize the translated dark and derive the matching zero-frame.
    fn linearize(
        &self,
        pipeline: &CalibrationPipeline,
        mut dark: RampCube,
        persist: &Path,
    ) -> Result<(RampCube, Option<Array3<f64>>, Option<Array3<f64>>)> {
        if self.config.request.is_rapid() {
            let linear = pipeline.linearize(&dark, Some(persist))?;
            log::info!(
                "Output is {}, taking the zero-frame from the linearized dark",
                self.config.request.readpatt
            );
            let (zero, zero_sb) = zeroframe::first_group(&linear);
            return Ok((linear, Some(zero), zero_sb));
        }

        let Some(zero) = dark.zeroframe.take() else {
            let linear = pipeline.linearize(&dark, Some(persist))?;
            return Ok((linear, None, None));
        };

        // The raw zero-frame is stale once the ramp is linearized
        dark.zeroframe = Some(Array3::zeros(zero.raw_dim()));
        let linear = pipeline.linearize(&dark, Some(persist))?;
        log::info!("Linearized dark shape: {:?}", linear.data.shape());

        log::info!("Linearizing the zero-frame separately");
        let single = zeroframe::as_single_group(&zero, &linear.header);
        let (zero, zero_sb) = zeroframe::first_group(&pipeline.linearize(&single, None)?);
        Ok((linear, Some(zero), zero_sb))
    }
}

/// Checks and fixes applied only to raw ADU input.
fn check_raw(dark: &mut RampCube, config: &PrepConfig) -> Result<()> {
    let (min, max) = dark
        .data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if max - min > RAW_ADU_RANGE {
        return Err(DarkPrepError::RawRangeExceeded(max - min));
    }
    if min < 0.0 {
        log::info!("Input dark holds signed values; shifting by {SIGNED_OFFSET}");
        dark.data.mapv_inplace(|v| v + SIGNED_OFFSET);
    }

    let input = dark.header.readpatt.as_str();
    config.readout_table.require(input)?;
    if !is_rapid(input) && !same_pattern(input, &config.request.readpatt) {
        return Err(DarkPrepError::IncompatibleReadout {
            input: input.to_uppercase(),
            requested: config.request.readpatt.clone(),
        });
    }
    Ok(())
}
