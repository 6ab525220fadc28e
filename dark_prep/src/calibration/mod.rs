//! Linearization of raw dark ramps.
//!
//! Linearization runs a fixed sequence of calibration steps: bad-pixel
//! flagging, saturation flagging, superbias subtraction, reference-pixel
//! correction and the non-linearity correction. The steps themselves are
//! external collaborators behind [`CalibrationStep`]; this module enforces
//! their order and records the superbias and reference-pixel signal they
//! remove, which is needed later to rebuild raw-like ramps.
//!
//! ```text
//! input ──► dq_init ──► saturation ──► superbias ──► refpix ──┬──► linearity ──► output
//!                                                              │
//!                                          removed = input - ──┘
//! ```

pub mod external;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DarkPrepError, Result};
use crate::io::fits;
use crate::ramp::RampCube;

pub use external::ExternalCommandStep;

/// The calibration steps, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepKind {
    BadPixel,
    Saturation,
    Superbias,
    RefPix,
    Linearity,
}

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        StepKind::BadPixel,
        StepKind::Saturation,
        StepKind::Superbias,
        StepKind::RefPix,
        StepKind::Linearity,
    ];

    /// Command-line name of the step.
    pub fn name(self) -> &'static str {
        match self {
            StepKind::BadPixel => "dq_init",
            StepKind::Saturation => "saturation",
            StepKind::Superbias => "superbias",
            StepKind::RefPix => "refpix",
            StepKind::Linearity => "linearity",
        }
    }

    /// Reference-file name used to override the step's default.
    pub fn override_name(self) -> Option<&'static str> {
        match self {
            StepKind::BadPixel => Some("mask"),
            StepKind::Saturation => Some("saturation"),
            StepKind::Superbias => Some("superbias"),
            StepKind::RefPix => None,
            StepKind::Linearity => Some("linearity"),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-step inputs: the step's configuration file and an optional reference
/// file replacing the default one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSettings {
    pub config_file: PathBuf,
    pub override_reference: Option<PathBuf>,
}

impl StepSettings {
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            override_reference: None,
        }
    }

    pub fn with_override(mut self, reference: Option<PathBuf>) -> Self {
        self.override_reference = reference;
        self
    }
}

/// One calibration step applied to a whole ramp.
pub trait CalibrationStep {
    fn kind(&self) -> StepKind;

    /// Apply the step; the returned ramp must have the input's shape.
    fn run(&self, cube: &RampCube, settings: &StepSettings) -> Result<RampCube>;
}

/// Settings for every standard step plus the program that runs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Executable invoked for each step
    pub program: String,
    pub bad_pixel: StepSettings,
    pub saturation: StepSettings,
    pub superbias: StepSettings,
    pub refpix: StepSettings,
    pub linearity: StepSettings,
}

impl PipelineSettings {
    pub fn for_kind(&self, kind: StepKind) -> &StepSettings {
        match kind {
            StepKind::BadPixel => &self.bad_pixel,
            StepKind::Saturation => &self.saturation,
            StepKind::Superbias => &self.superbias,
            StepKind::RefPix => &self.refpix,
            StepKind::Linearity => &self.linearity,
        }
    }
}

/// Ordered calibration steps with their settings.
pub struct CalibrationPipeline {
    steps: Vec<(Box<dyn CalibrationStep>, StepSettings)>,
}

impl fmt::Debug for CalibrationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|(step, _)| step.kind()))
            .finish()
    }
}

impl CalibrationPipeline {
    /// Build a pipeline, rejecting steps that are repeated or out of order.
    pub fn new(steps: Vec<(Box<dyn CalibrationStep>, StepSettings)>) -> Result<Self> {
        for pair in steps.windows(2) {
            let (before, after) = (pair[0].0.kind(), pair[1].0.kind());
            if before >= after {
                return Err(DarkPrepError::StepOrder(format!(
                    "{after} cannot run after {before}"
                )));
            }
        }
        if !steps
            .iter()
            .any(|(step, _)| step.kind() == StepKind::Linearity)
        {
            return Err(DarkPrepError::StepOrder(
                "the linearity step is required".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    /// The five standard steps, each run by an external command.
    pub fn from_config(settings: &PipelineSettings) -> Result<Self> {
        let steps = StepKind::ALL
            .iter()
            .map(|&kind| {
                let step: Box<dyn CalibrationStep> =
                    Box::new(ExternalCommandStep::new(kind, &settings.program));
                (step, settings.for_kind(kind).clone())
            })
            .collect();
        Self::new(steps)
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|(step, _)| step.kind()).collect()
    }

    /// Run every step on `cube`.
    ///
    /// The difference between the input and the ramp entering the linearity
    /// step becomes the output's `sb_and_refpix`. When `persist_to` is given
    /// the linearized ramp is also written there.
    pub fn linearize(&self, cube: &RampCube, persist_to: Option<&Path>) -> Result<RampCube> {
        let mut current = cube.clone();
        let mut removed = None;

        for (step, settings) in &self.steps {
            let kind = step.kind();
            if kind == StepKind::Linearity {
                removed = Some(&cube.data - &current.data);
            }

            log::info!("Running {kind} step on ramp {:?}", current.data.shape());
            let next = step.run(&current, settings)?;
            if next.data.dim() != current.data.dim() {
                return Err(DarkPrepError::Step {
                    step: kind,
                    message: format!(
                        "returned shape {:?}, expected {:?}",
                        next.data.shape(),
                        current.data.shape()
                    ),
                });
            }
            current = next;
        }

        current.sb_and_refpix = removed;
        if let Some(path) = persist_to {
            fits::write_ramp(&current, path)?;
            log::info!("Linearized dark saved as {}", path.display());
        }
        Ok(current)
    }
}

#[cfg(test)]
pub(crate) mod test_steps {
    //! In-process steps standing in for the real calibration pipeline.

    use super::*;

    /// Subtracts a constant; used for the superbias and refpix stand-ins.
    pub struct Offset {
        pub kind: StepKind,
        pub offset: f64,
    }

    impl CalibrationStep for Offset {
        fn kind(&self) -> StepKind {
            self.kind
        }

        fn run(&self, cube: &RampCube, _settings: &StepSettings) -> Result<RampCube> {
            let mut out = cube.clone();
            out.data.mapv_inplace(|v| v - self.offset);
            Ok(out)
        }
    }

    /// Scales the data; stands in for the non-linearity correction.
    pub struct Scale(pub f64);

    impl CalibrationStep for Scale {
        fn kind(&self) -> StepKind {
            StepKind::Linearity
        }

        fn run(&self, cube: &RampCube, _settings: &StepSettings) -> Result<RampCube> {
            let mut out = cube.clone();
            out.data.mapv_inplace(|v| v * self.0);
            Ok(out)
        }
    }

    /// The standard sequence: superbias 100, refpix 5, linearity x2.
    pub fn standard() -> CalibrationPipeline {
        let settings = StepSettings::new("step.cfg");
        let steps: Vec<(Box<dyn CalibrationStep>, StepSettings)> = vec![
            (
                Box::new(Offset {
                    kind: StepKind::BadPixel,
                    offset: 0.0,
                }),
                settings.clone(),
            ),
            (
                Box::new(Offset {
                    kind: StepKind::Saturation,
                    offset: 0.0,
                }),
                settings.clone(),
            ),
            (
                Box::new(Offset {
                    kind: StepKind::Superbias,
                    offset: 100.0,
                }),
                settings.clone(),
            ),
            (
                Box::new(Offset {
                    kind: StepKind::RefPix,
                    offset: 5.0,
                }),
                settings.clone(),
            ),
            (Box::new(Scale(2.0)), settings),
        ];
        match CalibrationPipeline::new(steps) {
            Ok(pipeline) => pipeline,
            Err(e) => panic!("standard test pipeline rejected: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_steps::*;
    use super::*;
    use crate::ramp::test_cubes::indexed_cube;
    use ndarray::Array4;
    use tempfile::tempdir;

    struct Truncate;

    impl CalibrationStep for Truncate {
        fn kind(&self) -> StepKind {
            StepKind::Saturation
        }

        fn run(&self, cube: &RampCube, _settings: &StepSettings) -> Result<RampCube> {
            let mut out = cube.clone();
            out.data = Array4::zeros((1, 1, 1, 1));
            Ok(out)
        }
    }

    #[test]
    fn test_removed_signal_is_input_minus_refpix_output() {
        let cube = indexed_cube(2, 3, 2, 2);
        let linearized = standard().linearize(&cube, None).unwrap();

        let removed = linearized.sb_and_refpix.as_ref().unwrap();
        assert!(removed.iter().all(|&v| v == 105.0));
        assert_eq!(linearized.data, cube.data.mapv(|v| (v - 105.0) * 2.0));
        linearized.check_invariants().unwrap();
    }

    #[test]
    fn test_out_of_order_steps_rejected() {
        let settings = StepSettings::new("step.cfg");
        let steps: Vec<(Box<dyn CalibrationStep>, StepSettings)> = vec![
            (
                Box::new(Offset {
                    kind: StepKind::RefPix,
                    offset: 1.0,
                }),
                settings.clone(),
            ),
            (
                Box::new(Offset {
                    kind: StepKind::Superbias,
                    offset: 1.0,
                }),
                settings.clone(),
            ),
            (Box::new(Scale(1.0)), settings),
        ];
        let err = CalibrationPipeline::new(steps).unwrap_err();
        assert!(matches!(err, DarkPrepError::StepOrder(_)));
    }

    #[test]
    fn test_linearity_step_required() {
        let steps: Vec<(Box<dyn CalibrationStep>, StepSettings)> = vec![(
            Box::new(Offset {
                kind: StepKind::Superbias,
                offset: 1.0,
            }),
            StepSettings::new("step.cfg"),
        )];
        assert!(CalibrationPipeline::new(steps).is_err());
    }

    #[test]
    fn test_shape_changing_step_aborts() {
        let steps: Vec<(Box<dyn CalibrationStep>, StepSettings)> = vec![
            (Box::new(Truncate), StepSettings::new("sat.cfg")),
            (Box::new(Scale(1.0)), StepSettings::new("lin.cfg")),
        ];
        let pipeline = CalibrationPipeline::new(steps).unwrap();
        let err = pipeline
            .linearize(&indexed_cube(1, 2, 2, 2), None)
            .unwrap_err();
        assert!(matches!(
            err,
            DarkPrepError::Step {
                step: StepKind::Saturation,
                ..
            }
        ));
    }

    #[test]
    fn test_linearized_ramp_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out_linearized_dark_current_ramp.fits");

        let cube = indexed_cube(1, 2, 2, 2);
        let linearized = standard().linearize(&cube, Some(&path)).unwrap();

        let saved = fits::read_ramp(&path).unwrap();
        assert_eq!(saved.data, linearized.data);
        assert_eq!(saved.sb_and_refpix, linearized.sb_and_refpix);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(StepKind::BadPixel.to_string(), "dq_init");
        assert_eq!(StepKind::RefPix.override_name(), None);
        assert!(StepKind::ALL.windows(2).all(|w| w[0] < w[1]));
    }
}
