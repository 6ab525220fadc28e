//! YAML parameter file and its validation.
//!
//! ```yaml
//! Inst:
//!   instrument: nircam
//!   use_JWST_pipeline: true
//! Readout:
//!   readpatt: BRIGHT2
//!   ngroup: 5
//!   nint: 2
//!   array_name: NRCA1_FULL
//!   namp: 4
//! Reffiles:
//!   dark: /data/darks/NRCA1_dark.fits
//!   linearized_darkfile: none
//!   readpattdefs: config
//!   subarray_defs: /data/NIRCam_subarray_definitions.list
//!   superbias: none
//! newRamp:
//!   dq_configfile: dq_init.cfg
//!   sat_configfile: saturation.cfg
//!   superbias_configfile: superbias.cfg
//!   refpix_configfile: refpix.cfg
//!   linear_configfile: linearity.cfg
//! Telescope:
//!   rotation: 0.0
//! Output:
//!   directory: /tmp/out
//!   file: seed.fits
//! ```
//!
//! File entries may be `none` or empty to mean "not provided".

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::calibration::{PipelineSettings, StepKind, StepSettings};
use crate::error::{DarkPrepError, Result};
use crate::ramp::{AmplifierCount, SubarrayBounds};
use crate::readout::{ReadoutPatternTable, ReadoutRequest};
use crate::subarray::{SubarrayGeometry, SubarrayResolver, SubarrayTable, FULL_FRAME_SIZE};

/// Keyword selecting the built-in readout pattern table.
pub const BUILTIN_READPATT_DEFS: &str = "config";

/// Program used for external calibration steps unless overridden.
pub const DEFAULT_PIPELINE_PROGRAM: &str = "strun";

const INSTRUMENTS: [&str; 3] = ["nircam", "niriss", "fgs"];

#[derive(Debug, Clone, Deserialize)]
pub struct ParamFile {
    #[serde(rename = "Inst")]
    pub inst: InstSection,
    #[serde(rename = "Readout")]
    pub readout: ReadoutSection,
    #[serde(rename = "Reffiles", default)]
    pub reffiles: ReffilesSection,
    #[serde(rename = "newRamp", default)]
    pub new_ramp: NewRampSection,
    #[serde(rename = "Telescope", default)]
    pub telescope: TelescopeSection,
    #[serde(rename = "Output")]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstSection {
    pub instrument: String,
    #[serde(rename = "use_JWST_pipeline", default)]
    pub use_jwst_pipeline: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadoutSection {
    pub readpatt: String,
    pub ngroup: usize,
    pub nint: usize,
    pub array_name: String,
    /// Overrides the amplifier count of the subarray definition
    #[serde(default)]
    pub namp: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReffilesSection {
    #[serde(default, deserialize_with = "optional_path")]
    pub dark: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub linearized_darkfile: Option<PathBuf>,
    /// Readout pattern table, or `config` for the built-in table
    #[serde(default, deserialize_with = "optional_path")]
    pub readpattdefs: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub subarray_defs: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub badpixmask: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub saturation: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub superbias: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub linearity: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRampSection {
    #[serde(default, deserialize_with = "optional_path")]
    pub dq_configfile: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub sat_configfile: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub superbias_configfile: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub refpix_configfile: Option<PathBuf>,
    #[serde(default, deserialize_with = "optional_path")]
    pub linear_configfile: Option<PathBuf>,
    /// Executable for the calibration steps
    #[serde(default)]
    pub pipeline_program: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelescopeSection {
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    pub directory: PathBuf,
    pub file: String,
}

/// `none`, `None` and blank strings all mean the entry was not given.
fn optional_path<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .map(PathBuf::from))
}

/// Where the dark comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DarkSource {
    /// Raw ADU ramp that still has to be linearized
    Raw(PathBuf),
    /// Ramp already linearized, with its `SBANDREFPIX` extension
    Linearized(PathBuf),
}

/// A validated request, ready for [`crate::prep::DarkPrep`].
#[derive(Debug, Clone)]
pub struct PrepConfig {
    pub instrument: String,
    pub source: DarkSource,
    pub readout_table: ReadoutPatternTable,
    pub request: ReadoutRequest,
    pub subarray: SubarrayGeometry,
    /// Present when the raw dark will be linearized
    pub pipeline: Option<PipelineSettings>,
    pub output_dir: PathBuf,
    /// Output file name without its `.fits` suffix
    pub output_base: String,
}

impl PrepConfig {
    /// Where the bundle is written.
    pub fn bundle_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_linear_dark_prep_object.fits", self.output_base))
    }

    /// Where the linearized raw dark is persisted.
    pub fn linearized_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_linearized_dark_current_ramp.fits", self.output_base))
    }
}

impl ParamFile {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| DarkPrepError::MissingFile {
            what: "parameter".to_string(),
            path: path.to_path_buf(),
        })?;
        Self::parse(&text)
    }

    /// Validate against the subarray table named in the file.
    pub fn resolve(&self) -> Result<PrepConfig> {
        match &self.reffiles.subarray_defs {
            Some(path) => {
                require_file("subarray definition", path)?;
                self.resolve_with(&SubarrayTable::load(path)?)
            }
            None => self.resolve_with(&FullFrameOnly),
        }
    }

    /// Validate every setting; no transformation runs before this succeeds.
    pub fn resolve_with(&self, resolver: &dyn SubarrayResolver) -> Result<PrepConfig> {
        let instrument = self.inst.instrument.trim().to_lowercase();
        if !INSTRUMENTS.contains(&instrument.as_str()) {
            return Err(DarkPrepError::UnsupportedMode(format!(
                "instrument '{}' is not supported",
                self.inst.instrument
            )));
        }

        let source = match (&self.reffiles.linearized_darkfile, &self.reffiles.dark) {
            (Some(path), _) => {
                require_file("linearized dark", path)?;
                DarkSource::Linearized(path.clone())
            }
            (None, Some(path)) => {
                if !self.inst.use_jwst_pipeline {
                    return Err(DarkPrepError::UnsupportedMode(
                        "a raw dark requires the calibration pipeline; \
                         set use_JWST_pipeline or provide a linearized dark"
                            .to_string(),
                    ));
                }
                require_file("dark current", path)?;
                DarkSource::Raw(path.clone())
            }
            (None, None) => {
                return Err(DarkPrepError::UnsupportedMode(
                    "neither a raw nor a linearized dark was given".to_string(),
                ))
            }
        };

        self.check_reference_files()?;

        let readout_table = match &self.reffiles.readpattdefs {
            Some(path) if path.as_os_str() != BUILTIN_READPATT_DEFS => {
                require_file("readout pattern definition", path)?;
                ReadoutPatternTable::load(path)?
            }
            _ => ReadoutPatternTable::nircam(),
        };
        let request = ReadoutRequest::from_table(
            &readout_table,
            &self.readout.readpatt,
            self.readout.ngroup,
            self.readout.nint,
        )?;

        let mut subarray = resolver.resolve(
            &instrument,
            &self.readout.array_name,
            self.telescope.rotation,
        )?;
        if let Some(namp) = self.readout.namp {
            subarray.amplifiers = AmplifierCount::try_from(namp)?;
        }
        crate::ramp::crop::check_amplifier_alignment(&subarray.bounds, subarray.amplifiers)?;

        let pipeline = match &source {
            DarkSource::Raw(_) => Some(self.pipeline_settings()?),
            DarkSource::Linearized(_) => None,
        };

        let output_base = self
            .output
            .file
            .trim()
            .strip_suffix(".fits")
            .unwrap_or(self.output.file.trim())
            .to_string();

        Ok(PrepConfig {
            instrument,
            source,
            readout_table,
            request,
            subarray,
            pipeline,
            output_dir: self.output.directory.clone(),
            output_base,
        })
    }

    /// Every named reference file must exist, whichever dark is used.
    fn check_reference_files(&self) -> Result<()> {
        let refs = &self.reffiles;
        for (what, file) in [
            ("dark current", &refs.dark),
            ("bad pixel mask", &refs.badpixmask),
            ("saturation", &refs.saturation),
            ("superbias", &refs.superbias),
            ("linearity", &refs.linearity),
        ] {
            if let Some(path) = file {
                require_file(what, path)?;
            }
        }
        Ok(())
    }

    fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let refs = &self.reffiles;
        let ramp = &self.new_ramp;
        let step = |kind: StepKind, config: &Option<PathBuf>, reference: &Option<PathBuf>| {
            let config = config
                .as_ref()
                .ok_or(DarkPrepError::MissingStepConfig(kind))?;
            require_file(&format!("{kind} step configuration"), config)?;
            Ok::<_, DarkPrepError>(StepSettings::new(config).with_override(reference.clone()))
        };

        Ok(PipelineSettings {
            program: ramp
                .pipeline_program
                .clone()
                .unwrap_or_else(|| DEFAULT_PIPELINE_PROGRAM.to_string()),
            bad_pixel: step(StepKind::BadPixel, &ramp.dq_configfile, &refs.badpixmask)?,
            saturation: step(StepKind::Saturation, &ramp.sat_configfile, &refs.saturation)?,
            superbias: step(StepKind::Superbias, &ramp.superbias_configfile, &refs.superbias)?,
            refpix: step(StepKind::RefPix, &ramp.refpix_configfile, &None)?,
            linearity: step(StepKind::Linearity, &ramp.linear_configfile, &refs.linearity)?,
        })
    }
}

fn require_file(what: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(DarkPrepError::MissingFile {
            what: what.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Resolver used when no subarray table is given: only full-frame apertures.
struct FullFrameOnly;

impl SubarrayResolver for FullFrameOnly {
    fn resolve(&self, _instrument: &str, name: &str, _rotation: f64) -> Result<SubarrayGeometry> {
        if !name.to_uppercase().ends_with("FULL") {
            return Err(DarkPrepError::UnknownSubarray(name.to_string()));
        }
        Ok(SubarrayGeometry {
            full_frame: (FULL_FRAME_SIZE, FULL_FRAME_SIZE),
            bounds: SubarrayBounds::full_frame(FULL_FRAME_SIZE, FULL_FRAME_SIZE),
            amplifiers: AmplifierCount::Four,
        })
    }
}
