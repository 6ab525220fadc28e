//! Calibration steps run as external command-line programs.

use std::process::Command;

use super::{CalibrationStep, StepKind, StepSettings};
use crate::error::{DarkPrepError, Result};
use crate::io::fits;
use crate::ramp::RampCube;

/// Runs one step through a `strun`-style program:
///
/// ```text
/// <program> <config_file> <input.fits> --output_file=<output.fits> [--override_<ref>=<file>]
/// ```
///
/// The ramp is exchanged through FITS files in a scratch directory and only
/// the `SCI` extension of the result is read back.
#[derive(Debug, Clone)]
pub struct ExternalCommandStep {
    kind: StepKind,
    program: String,
}

impl ExternalCommandStep {
    pub fn new(kind: StepKind, program: &str) -> Self {
        Self {
            kind,
            program: program.to_string(),
        }
    }

    fn failure(&self, message: String) -> DarkPrepError {
        DarkPrepError::Step {
            step: self.kind,
            message,
        }
    }
}

impl CalibrationStep for ExternalCommandStep {
    fn kind(&self) -> StepKind {
        self.kind
    }

    fn run(&self, cube: &RampCube, settings: &StepSettings) -> Result<RampCube> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join(format!("{}_input.fits", self.kind.name()));
        let output = scratch.path().join(format!("{}_output.fits", self.kind.name()));
        fits::write_ramp(cube, &input)?;

        let mut command = Command::new(&self.program);
        command
            .arg(&settings.config_file)
            .arg(&input)
            .arg(format!("--output_file={}", output.display()));
        if let (Some(name), Some(reference)) =
            (self.kind.override_name(), &settings.override_reference)
        {
            command.arg(format!("--override_{name}={}", reference.display()));
        }

        log::debug!("Running {:?}", command);
        let result = command
            .output()
            .map_err(|e| self.failure(format!("could not start {}: {e}", self.program)))?;
        if !result.status.success() {
            return Err(self.failure(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        if !output.exists() {
            return Err(self.failure(format!("no output written to {}", output.display())));
        }

        let mut calibrated = cube.clone();
        calibrated.data = fits::read_science(&output)?;
        Ok(calibrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ramp::test_cubes::indexed_cube;

    #[test]
    fn test_missing_program_is_step_error() {
        let step = ExternalCommandStep::new(StepKind::Superbias, "/no/such/strun");
        let err = step
            .run(&indexed_cube(1, 2, 2, 2), &StepSettings::new("superbias.cfg"))
            .unwrap_err();
        assert!(matches!(
            err,
            DarkPrepError::Step {
                step: StepKind::Superbias,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_output_read_back() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_strun.sh");
        let args_log = dir.path().join("args.txt");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" > {}\ncp \"$2\" \"${{3#--output_file=}}\"\n",
                args_log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let step = ExternalCommandStep::new(StepKind::Linearity, script.to_str().unwrap());
        let settings =
            StepSettings::new("lin.cfg").with_override(Some("/refs/linearity.fits".into()));
        let cube = indexed_cube(1, 3, 2, 2);

        let out = step.run(&cube, &settings).unwrap();
        assert_eq!(out, cube);

        let args = std::fs::read_to_string(&args_log).unwrap();
        assert!(args.starts_with("lin.cfg "));
        assert!(args.contains("--override_linearity=/refs/linearity.fits"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_reports_status() {
        let step = ExternalCommandStep::new(StepKind::RefPix, "false");
        let err = step
            .run(&indexed_cube(1, 1, 2, 2), &StepSettings::new("refpix.cfg"))
            .unwrap_err();
        assert!(err.to_string().contains("refpix"));
    }
}
