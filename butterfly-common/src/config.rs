//! Run configuration consumed by the conversion pipeline.
//!
//! The CLI fills a [`ConvertConfig`] from flags and an optional TOML file;
//! the library crates only ever see the finished struct.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::suggest::unknown_value;
use crate::{Error, Result};

/// Number of levels of detail, 0 (coarsest) to 15 (finest).
pub const LOD_COUNT: usize = 16;

/// Line simplification algorithm applied below the finest LOD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineSimplification {
    #[default]
    DouglasPeucker,
    VisvalingamWhyatt,
}

impl LineSimplification {
    const NAMES: &'static [&'static str] = &["dp", "vw", "douglas-peucker", "visvalingam-whyatt"];

    /// Flag stored in the meta file: true for Douglas-Peucker.
    pub fn meta_flag(self) -> bool {
        self == LineSimplification::DouglasPeucker
    }
}

impl FromStr for LineSimplification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dp" | "douglas-peucker" => Ok(Self::DouglasPeucker),
            "vw" | "visvalingam-whyatt" => Ok(Self::VisvalingamWhyatt),
            _ => Err(unknown_value("line algorithm", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for LineSimplification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DouglasPeucker => write!(f, "Douglas-Peucker"),
            Self::VisvalingamWhyatt => write!(f, "Visvalingam-Whyatt"),
        }
    }
}

/// Tile assignment strategy, fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sorting {
    MostNodes,
    #[default]
    FirstNode,
    Subdivide,
}

impl Sorting {
    const NAMES: &'static [&'static str] = &["first", "most", "subdivide"];

    /// Code stored in the meta file.
    pub fn code(self) -> i32 {
        match self {
            Sorting::MostNodes => 0,
            Sorting::FirstNode => 1,
            Sorting::Subdivide => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Sorting::MostNodes),
            1 => Some(Sorting::FirstNode),
            2 => Some(Sorting::Subdivide),
            _ => None,
        }
    }
}

impl FromStr for Sorting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "first" | "first-node" => Ok(Self::FirstNode),
            "most" | "most-nodes" => Ok(Self::MostNodes),
            "subdivide" => Ok(Self::Subdivide),
            _ => Err(unknown_value("sort mode", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for Sorting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MostNodes => write!(f, "most-nodes"),
            Self::FirstNode => write!(f, "first-node"),
            Self::Subdivide => write!(f, "subdivide"),
        }
    }
}

/// Logging verbosity of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl Verbosity {
    const NAMES: &'static [&'static str] = &["error", "warning", "info", "debug"];

    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Error => LevelFilter::Error,
            Verbosity::Warning => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }

    /// Raise the verbosity by `steps` levels, saturating at `Debug`.
    pub fn raised(self, steps: u8) -> Self {
        let order = [Verbosity::Error, Verbosity::Warning, Verbosity::Info, Verbosity::Debug];
        let at = order.iter().position(|v| *v == self).unwrap_or(2);
        order[(at + steps as usize).min(order.len() - 1)]
    }
}

impl FromStr for Verbosity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            _ => Err(unknown_value("verbosity", s, Self::NAMES)),
        }
    }
}

/// Memory caps for one bounded sub-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_nodes: usize,
    pub max_ways: usize,
    pub max_relations: usize,
    pub max_pending_ways: usize,
    pub max_pending_relations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_nodes: 11_958_657,
            max_ways: 1_574_803,
            max_relations: 1_000_000,
            max_pending_ways: 1_000_000,
            max_pending_relations: 500_000,
        }
    }
}

/// Everything a conversion run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Also write `.txt` siblings of every binary file.
    pub debug_text: bool,
    pub simplification: LineSimplification,
    pub sorting: Sorting,
    pub verbosity: Verbosity,
    /// Root tile count per LOD; 0 disables the LOD.
    pub lods: [u64; LOD_COUNT],
    pub limits: Limits,
    /// Largest tile array allocated at once before a LOD is split into row bands.
    pub max_tiles_per_pass: u64,
    /// Re-reads of the input spent on completing pending entities.
    pub reconcile_passes: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        let mut lods = [0; LOD_COUNT];
        lods[LOD_COUNT - 1] = 1;
        Self {
            input: PathBuf::new(),
            output: PathBuf::from("."),
            debug_text: false,
            simplification: LineSimplification::default(),
            sorting: Sorting::default(),
            verbosity: Verbosity::default(),
            lods,
            limits: Limits::default(),
            max_tiles_per_pass: 1 << 24,
            reconcile_passes: 4,
        }
    }
}

impl ConvertConfig {
    /// Load a TOML configuration file. Missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::InvalidInput(format!("config: {e}")))
    }

    /// Indices of the LODs with a non-zero tile count, finest first.
    pub fn active_lods(&self) -> Vec<usize> {
        (0..LOD_COUNT).rev().filter(|&l| self.lods[l] > 0).collect()
    }

    /// Finest active LOD, which also receives single-point objects.
    pub fn finest_lod(&self) -> Option<usize> {
        self.active_lods().first().copied()
    }

    pub fn validate(&self) -> Result<()> {
        if self.active_lods().is_empty() {
            return Err(Error::InvalidInput(
                "at least one LOD needs a non-zero tile count".into(),
            ));
        }
        if self.max_tiles_per_pass == 0 {
            return Err(Error::InvalidInput("max_tiles_per_pass must be positive".into()));
        }
        let l = &self.limits;
        if l.max_nodes == 0 || l.max_ways == 0 || l.max_relations == 0 {
            return Err(Error::InvalidInput("entity caps must be positive".into()));
        }
        Ok(())
    }
}

/// Parse a dash-separated list of root tile counts, coarsest LOD first.
///
/// Fewer than 16 values leave the remaining (finer) LODs disabled.
pub fn parse_lods(s: &str) -> Result<[u64; LOD_COUNT]> {
    let mut lods = [0; LOD_COUNT];
    let parts: Vec<&str> = s.split('-').map(str::trim).collect();
    if parts.len() > LOD_COUNT {
        return Err(Error::InvalidInput(format!(
            "expected at most {LOD_COUNT} tile counts, got {}",
            parts.len()
        )));
    }
    for (slot, part) in lods.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| Error::InvalidInput(format!("tile count '{part}' is not a number")))?;
    }
    Ok(lods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_is_single_tile_finest_lod() {
        let cfg = ConvertConfig::default();
        assert_eq!(cfg.active_lods(), vec![15]);
        assert_eq!(cfg.finest_lod(), Some(15));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lods_parse_coarsest_first() {
        let lods = parse_lods("0-0-0-0-0-0-0-0-0-0-0-0-1-2-4-8").unwrap();
        assert_eq!(lods[12], 1);
        assert_eq!(lods[15], 8);
        assert_eq!(lods[0], 0);

        let short = parse_lods("1-2").unwrap();
        assert_eq!(&short[..3], &[1, 2, 0]);

        assert!(parse_lods("1-x").is_err());
        assert!(parse_lods(&["1"; 17].join("-")).is_err());
    }

    #[test]
    fn active_lods_run_finest_to_coarsest() {
        let cfg = ConvertConfig {
            lods: parse_lods("1-0-4").unwrap(),
            ..ConvertConfig::default()
        };
        assert_eq!(cfg.active_lods(), vec![2, 0]);
    }

    #[test]
    fn empty_lods_are_rejected() {
        let cfg = ConvertConfig {
            lods: [0; LOD_COUNT],
            ..ConvertConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn option_values_parse_and_suggest() {
        assert_eq!(
            "vw".parse::<LineSimplification>().unwrap(),
            LineSimplification::VisvalingamWhyatt
        );
        assert_eq!("most".parse::<Sorting>().unwrap(), Sorting::MostNodes);
        assert_eq!("warn".parse::<Verbosity>().unwrap(), Verbosity::Warning);
        let err = "subdivid".parse::<Sorting>().unwrap_err().to_string();
        assert!(err.contains("did you mean 'subdivide'"));
    }

    #[test]
    fn meta_codes() {
        assert_eq!(Sorting::MostNodes.code(), 0);
        assert_eq!(Sorting::FirstNode.code(), 1);
        assert_eq!(Sorting::Subdivide.code(), 2);
        assert_eq!(Sorting::from_code(2), Some(Sorting::Subdivide));
        assert!(LineSimplification::DouglasPeucker.meta_flag());
        assert!(!LineSimplification::VisvalingamWhyatt.meta_flag());
    }

    #[test]
    fn verbosity_raises_and_saturates() {
        assert_eq!(Verbosity::Info.raised(1), Verbosity::Debug);
        assert_eq!(Verbosity::Error.raised(2), Verbosity::Info);
        assert_eq!(Verbosity::Debug.raised(3), Verbosity::Debug);
        assert_eq!(Verbosity::Warning.level_filter(), LevelFilter::Warn);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
sorting = "subdivide"
simplification = "visvalingam-whyatt"
lods = [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]

[limits]
max_nodes = 100
"#
        )
        .unwrap();

        let cfg = ConvertConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(cfg.sorting, Sorting::Subdivide);
        assert_eq!(cfg.simplification, LineSimplification::VisvalingamWhyatt);
        assert_eq!(cfg.limits.max_nodes, 100);
        assert_eq!(cfg.limits.max_ways, Limits::default().max_ways);
        assert_eq!(cfg.active_lods(), vec![15, 0]);
    }

    #[test]
    fn bad_toml_is_invalid_input() {
        let err = ConvertConfig::from_toml_str("sorting = 3").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
