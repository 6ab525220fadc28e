//! Detector subarray geometry.
//!
//! Full detector geometry (aperture definitions, rotation) lives in an
//! external collaborator behind [`SubarrayResolver`]. [`SubarrayTable`] is a
//! plain-text implementation that is sufficient for unrotated subarrays.

use std::path::Path;

use crate::error::{DarkPrepError, Result};
use crate::ramp::{AmplifierCount, SubarrayBounds};

/// Full-frame size of the supported detectors.
pub const FULL_FRAME_SIZE: usize = 2048;

/// Where a named subarray sits on the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubarrayGeometry {
    /// `(rows, cols)` of the full detector
    pub full_frame: (usize, usize),
    pub bounds: SubarrayBounds,
    pub amplifiers: AmplifierCount,
}

impl SubarrayGeometry {
    pub fn is_full_frame(&self) -> bool {
        let (rows, cols) = self.full_frame;
        self.bounds.is_full_frame(rows, cols)
    }
}

/// Maps an aperture name to its detector bounds.
pub trait SubarrayResolver {
    /// Resolve `name` for `instrument`; `rotation` is the telescope roll in
    /// degrees, which implementations may ignore.
    fn resolve(&self, instrument: &str, name: &str, rotation: f64) -> Result<SubarrayGeometry>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubarrayEntry {
    name: String,
    bounds: SubarrayBounds,
    amplifiers: AmplifierCount,
}

/// Subarray definitions read from a whitespace-separated table.
#[derive(Debug, Clone)]
pub struct SubarrayTable {
    entries: Vec<SubarrayEntry>,
    full_frame: (usize, usize),
}

impl Default for SubarrayTable {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            full_frame: (FULL_FRAME_SIZE, FULL_FRAME_SIZE),
        }
    }
}

impl SubarrayTable {
    /// Override the full-frame size (rows, cols).
    pub fn with_full_frame(mut self, rows: usize, cols: usize) -> Self {
        self.full_frame = (rows, cols);
        self
    }

    /// Parse a table whose header row names `name xstart ystart xend yend
    /// namp` in any order. Bounds are 0-based and inclusive.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let header: Vec<String> = lines
            .next()
            .ok_or_else(|| malformed("subarray definition table is empty".to_string()))?
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let column = |name: &str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| malformed(format!("subarray table has no '{name}' column")))
        };
        let cols = [
            column("name")?,
            column("xstart")?,
            column("ystart")?,
            column("xend")?,
            column("yend")?,
            column("namp")?,
        ];

        let mut entries = Vec::new();
        for line in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let field = |idx: usize| {
                fields
                    .get(idx)
                    .copied()
                    .ok_or_else(|| malformed(format!("short row in subarray table: '{line}'")))
            };
            let number = |idx: usize| -> Result<usize> {
                let raw = field(idx)?;
                raw.parse::<usize>()
                    .map_err(|_| malformed(format!("bad value '{raw}' in subarray row '{line}'")))
            };

            let amps = u32::try_from(number(cols[5])?).unwrap_or(u32::MAX);
            entries.push(SubarrayEntry {
                name: field(cols[0])?.to_uppercase(),
                bounds: SubarrayBounds::new(
                    number(cols[1])?,
                    number(cols[2])?,
                    number(cols[3])?,
                    number(cols[4])?,
                ),
                amplifiers: AmplifierCount::try_from(amps)?,
            });
        }

        Ok(Self {
            entries,
            ..Self::default()
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| DarkPrepError::MissingFile {
            what: "subarray definition".to_string(),
            path: path.to_path_buf(),
        })?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SubarrayResolver for SubarrayTable {
    fn resolve(&self, instrument: &str, name: &str, _rotation: f64) -> Result<SubarrayGeometry> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| DarkPrepError::UnknownSubarray(name.trim().to_string()))?;

        let (rows, cols) = self.full_frame;
        if entry.bounds.x_max >= cols || entry.bounds.y_max >= rows {
            return Err(DarkPrepError::BoundsOutsideFrame {
                bounds: (
                    entry.bounds.x_min,
                    entry.bounds.y_min,
                    entry.bounds.x_max,
                    entry.bounds.y_max,
                ),
                rows,
                cols,
            });
        }

        log::debug!(
            "{instrument} subarray {} resolved to {:?} with {:?} amplifier(s)",
            entry.name,
            entry.bounds,
            entry.amplifiers
        );
        Ok(SubarrayGeometry {
            full_frame: self.full_frame,
            bounds: entry.bounds,
            amplifiers: entry.amplifiers,
        })
    }
}

fn malformed(message: String) -> DarkPrepError {
    DarkPrepError::Shape(message)
}
