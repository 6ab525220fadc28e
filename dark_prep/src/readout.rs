//! Readout pattern definitions.
//!
//! A readout pattern fixes how many frames are averaged into each group
//! (`nframe`), how many frames are dropped between groups (`nskip`), and the
//! largest number of groups allowed for a full-frame exposure (`maxgroups`).
//! Only the RAPID family reads out every frame, so only RAPID-family data can
//! be re-averaged into a different cadence.

use std::path::Path;

use crate::error::{DarkPrepError, Result};

/// Patterns that read out every frame individually.
pub const RAPID_FAMILY: [&str; 3] = ["RAPID", "NISRAPID", "FGSRAPID"];

/// Returns true when `name` is a RAPID-family pattern (case-insensitive).
pub fn is_rapid(name: &str) -> bool {
    RAPID_FAMILY
        .iter()
        .any(|rapid| rapid.eq_ignore_ascii_case(name.trim()))
}

/// Returns true when two pattern names refer to the same pattern.
pub fn same_pattern(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// A named readout cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadoutPatternDefinition {
    /// Pattern name, stored upper case
    pub name: String,
    /// Frames averaged into each group
    pub nframe: usize,
    /// Frames skipped after each group
    pub nskip: usize,
    /// Maximum number of groups in one integration
    pub maxgroups: usize,
}

impl ReadoutPatternDefinition {
    pub fn new(name: &str, nframe: usize, nskip: usize, maxgroups: usize) -> Self {
        Self {
            name: name.trim().to_uppercase(),
            nframe,
            nskip,
            maxgroups,
        }
    }

    /// Frames consumed per output group, including the skipped ones.
    pub fn frames_per_group(&self) -> usize {
        self.nframe + self.nskip
    }
}

/// Lookup table of readout patterns, matched case-insensitively by name.
#[derive(Debug, Clone, Default)]
pub struct ReadoutPatternTable {
    patterns: Vec<ReadoutPatternDefinition>,
}

impl ReadoutPatternTable {
    pub fn new(patterns: Vec<ReadoutPatternDefinition>) -> Self {
        Self { patterns }
    }

    /// Built-in NIRCam readout patterns.
    pub fn nircam() -> Self {
        Self::new(vec![
            ReadoutPatternDefinition::new("RAPID", 1, 0, 10),
            ReadoutPatternDefinition::new("BRIGHT1", 1, 1, 10),
            ReadoutPatternDefinition::new("BRIGHT2", 2, 0, 10),
            ReadoutPatternDefinition::new("SHALLOW2", 2, 3, 10),
            ReadoutPatternDefinition::new("SHALLOW4", 4, 1, 10),
            ReadoutPatternDefinition::new("MEDIUM2", 2, 8, 10),
            ReadoutPatternDefinition::new("MEDIUM8", 8, 2, 10),
            ReadoutPatternDefinition::new("DEEP2", 2, 18, 20),
            ReadoutPatternDefinition::new("DEEP8", 8, 12, 20),
        ])
    }

    /// Parse a whitespace-separated table.
    ///
    /// The first non-comment line is a header naming the columns `name`,
    /// `nframe`, `nskip` and `maxgroups` in any order; extra columns are
    /// ignored. Lines starting with `#` are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let header: Vec<String> = lines
            .next()
            .ok_or_else(|| {
                DarkPrepError::InvalidReadout("readout pattern table is empty".to_string())
            })?
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let column = |name: &str| {
            header.iter().position(|h| h == name).ok_or_else(|| {
                DarkPrepError::InvalidReadout(format!(
                    "readout pattern table has no '{name}' column"
                ))
            })
        };
        let name_col = column("name")?;
        let nframe_col = column("nframe")?;
        let nskip_col = column("nskip")?;
        let maxgroups_col = column("maxgroups")?;

        let mut patterns = Vec::new();
        for line in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let field = |idx: usize| {
                fields.get(idx).copied().ok_or_else(|| {
                    DarkPrepError::InvalidReadout(format!("short row in readout table: '{line}'"))
                })
            };
            let number = |idx: usize| -> Result<usize> {
                let raw = field(idx)?;
                raw.parse::<usize>().map_err(|_| {
                    DarkPrepError::InvalidReadout(format!(
                        "non-integer value '{raw}' in readout table row '{line}'"
                    ))
                })
            };

            patterns.push(ReadoutPatternDefinition::new(
                field(name_col)?,
                number(nframe_col)?,
                number(nskip_col)?,
                number(maxgroups_col)?,
            ));
        }

        Ok(Self::new(patterns))
    }

    /// Load a table from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| DarkPrepError::MissingFile {
            what: "readout pattern definition".to_string(),
            path: path.to_path_buf(),
        })?;
        Self::parse(&text)
    }

    /// Find a pattern by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&ReadoutPatternDefinition> {
        self.patterns
            .iter()
            .find(|pattern| same_pattern(&pattern.name, name))
    }

    /// Find a pattern by name or fail with a configuration error.
    pub fn require(&self, name: &str) -> Result<&ReadoutPatternDefinition> {
        self.get(name)
            .ok_or_else(|| DarkPrepError::UnknownReadoutPattern(name.trim().to_uppercase()))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Target cadence and size of the prepared exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadoutRequest {
    /// Requested readout pattern name, upper case
    pub readpatt: String,
    pub nframe: usize,
    pub nskip: usize,
    pub ngroup: usize,
    pub nint: usize,
}

impl ReadoutRequest {
    /// Build a request from an explicit cadence.
    pub fn new(
        readpatt: &str,
        nframe: usize,
        nskip: usize,
        ngroup: usize,
        nint: usize,
    ) -> Result<Self> {
        if nframe == 0 {
            return Err(DarkPrepError::InvalidReadout("nframe must be at least 1".to_string()));
        }
        if ngroup == 0 {
            return Err(DarkPrepError::InvalidReadout("ngroup must be at least 1".to_string()));
        }
        if nint == 0 {
            return Err(DarkPrepError::InvalidReadout("nint must be at least 1".to_string()));
        }
        Ok(Self {
            readpatt: readpatt.trim().to_uppercase(),
            nframe,
            nskip,
            ngroup,
            nint,
        })
    }

    /// Build a request for a named pattern, adopting the table's `nframe` and
    /// `nskip`. A group count above the pattern maximum is clamped.
    pub fn from_table(
        table: &ReadoutPatternTable,
        readpatt: &str,
        ngroup: usize,
        nint: usize,
    ) -> Result<Self> {
        let pattern = table.require(readpatt)?;
        log::info!(
            "Requested readout pattern {} is valid. Using nframe = {} and nskip = {}",
            pattern.name,
            pattern.nframe,
            pattern.nskip
        );

        let ngroup = if ngroup > pattern.maxgroups {
            log::warn!(
                "{} is limited to a maximum of {} groups. Proceeding with ngroup = {}.",
                pattern.name,
                pattern.maxgroups,
                pattern.maxgroups
            );
            pattern.maxgroups
        } else {
            ngroup
        };

        Self::new(&pattern.name, pattern.nframe, pattern.nskip, ngroup, nint)
    }

    /// Raw frames needed to build every requested group.
    pub fn frames_required(&self) -> usize {
        self.ngroup * (self.nframe + self.nskip)
    }

    pub fn is_rapid(&self) -> bool {
        is_rapid(&self.readpatt)
    }
}
