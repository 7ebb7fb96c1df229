#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Typed configuration for the facility map pipeline.
//!
//! Loaded from a TOML file into explicit structs with plain validation
//! code; every component receives the parsed [`Config`] (or a slice of
//! it) as an explicit dependency. There is no global config state and no
//! reflection-driven construction.
//!
//! Result file entries are patterns containing a `{location}` placeholder
//! which resolves to the location's admin path with `/` separators; an
//! empty location resolves to the merged (global) artifact path.

use std::fs;
use std::path::{Path, PathBuf};

use facility_map_models::{ColumnSpec, Location};
use serde::Deserialize;

/// Configuration loading/validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File read failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse failed.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is empty or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A user-supplied points file with its coordinate column names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PointsFile {
    pub file: PathBuf,
    pub xy_cols: [String; 2],
}

/// The user-supplied village centers file: one named point per village.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VillageCentersFile {
    pub file: PathBuf,
    /// Column holding the village name.
    pub village_col: String,
    pub xy_cols: [String; 2],
}

/// A user-supplied baseline facilities file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BaselineFile {
    pub file: PathBuf,
    pub xy_cols: [String; 2],
    /// Columns surfaced to the visualization layer.
    #[serde(default)]
    pub info_cols: Vec<String>,
}

/// User parameters and raw input files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Args {
    /// Households below this count mark a cluster as small.
    pub threshold_households: u64,
    /// Max allowed percentage of small clusters.
    pub threshold_village_perc: f64,
    /// Rows per chunk during household derivation.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Iteration budget for k-means fits.
    #[serde(default = "default_kmeans_max_iter")]
    pub kmeans_max_iter: usize,
    /// User-supplied village centers (name + coordinates).
    pub village_centers: VillageCentersFile,
    /// Optional user-supplied baseline facilities.
    #[serde(default)]
    pub baseline_facilities: Option<BaselineFile>,
    /// Directory for the disk-backed computation cache; in-memory when
    /// unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

const fn default_chunk_size() -> usize {
    1_000_000
}

const fn default_kmeans_max_iter() -> usize {
    300
}

/// An admin-annotated file with its admin column names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdmFile {
    pub file: PathBuf,
    pub adm_cols: Vec<String>,
}

/// Prepared input files under canonical column names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Inputs {
    /// Flat list of all locations derived from village centers.
    pub all_locations_file: PathBuf,
    /// Raw building centroids (large, chunk-processed).
    pub buildings: PointsFile,
    /// Admin boundary polygons (GeoJSON).
    pub shapes: AdmFile,
    /// Derived households table.
    pub households: AdmFile,
    /// Prepared village centers table (admin columns end with the
    /// village name column).
    pub village_centers: AdmFile,
    /// Prepared baseline facilities table.
    #[serde(default)]
    pub baseline_facilities_file: Option<PathBuf>,
    /// Canonical coordinate column names for all prepared tables.
    pub xy_cols: [String; 2],
}

/// Per-location result file patterns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultsClusters {
    pub file: String,
    pub centers_file: String,
    pub counts_file: String,
}

/// Facilities result pattern and placement parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultsFacilities {
    pub file: String,
    /// Facilities placed per cluster.
    pub n_facilities: usize,
}

/// Result artifact patterns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Results {
    /// Run results directory.
    pub dir: PathBuf,
    pub clusters: ResultsClusters,
    /// Cluster shapes (GeoJSON) pattern.
    pub shapes_file: String,
    pub facilities: ResultsFacilities,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub args: Args,
    pub inputs: Inputs,
    pub results: Results,
    /// Runtime location filter (anchored regex patterns); not part of
    /// the config file.
    #[serde(default, skip)]
    pub location_filter: Vec<String>,
}

impl Config {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.inputs.households.adm_cols.is_empty() {
            return Err(ConfigError::Invalid(
                "inputs.households.adm_cols must not be empty".into(),
            ));
        }
        if self.inputs.village_centers.adm_cols.len() != self.inputs.households.adm_cols.len() + 1 {
            return Err(ConfigError::Invalid(
                "inputs.village_centers.adm_cols must extend inputs.households.adm_cols \
                 by exactly the village name column"
                    .into(),
            ));
        }
        if self
            .inputs
            .village_centers
            .adm_cols
            .iter()
            .zip(&self.inputs.households.adm_cols)
            .any(|(a, b)| a != b)
        {
            return Err(ConfigError::Invalid(
                "inputs.village_centers.adm_cols must start with inputs.households.adm_cols".into(),
            ));
        }
        if self.results.facilities.n_facilities == 0 {
            return Err(ConfigError::Invalid(
                "results.facilities.n_facilities must be at least 1".into(),
            ));
        }
        if self.args.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "args.chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Canonical column names shared by all derived tables.
    #[must_use]
    pub fn column_spec(&self) -> ColumnSpec {
        let village_col = self
            .inputs
            .village_centers
            .adm_cols
            .last()
            .cloned()
            .unwrap_or_else(|| "village".to_string());
        ColumnSpec {
            adm_cols: self.inputs.households.adm_cols.clone(),
            village_col,
            lon_col: self.inputs.xy_cols[0].clone(),
            lat_col: self.inputs.xy_cols[1].clone(),
        }
    }

    /// True when a baseline facility set is configured.
    #[must_use]
    pub const fn has_baseline(&self) -> bool {
        self.args.baseline_facilities.is_some()
    }

    /// Reads the locations list written during data preparation,
    /// applying the runtime location filter when one is set.
    ///
    /// Returns an empty list when the file does not exist yet.
    #[must_use]
    pub fn locations(&self) -> Vec<Location> {
        let all: Vec<Location> = fs::read_to_string(&self.inputs.all_locations_file).map_or_else(
            |_| Vec::new(),
            |text| {
                text.lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(Location::parse)
                    .collect()
            },
        );

        if self.location_filter.is_empty() {
            return all;
        }

        let patterns: Vec<regex::Regex> = self
            .location_filter
            .iter()
            .filter_map(|p| match regex::Regex::new(&format!("^{p}")) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Ignoring invalid location filter {p:?}: {e}");
                    None
                }
            })
            .collect();

        all.into_iter()
            .filter(|loc| {
                let name = loc.to_string();
                patterns.iter().any(|re| re.is_match(&name))
            })
            .collect()
    }

    /// Path of the failed-locations list.
    #[must_use]
    pub fn failed_locations_file(&self) -> PathBuf {
        self.results.dir.join("locations.failed.csv")
    }
}

/// Resolves a `{location}` file pattern for a location.
///
/// The location's `:` delimiter becomes a path separator. An empty
/// location yields the merged/global artifact path. Parent directories
/// are created when `mkdir` is set.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn location_path(
    pattern: &str,
    location: Option<&Location>,
    mkdir: bool,
) -> std::io::Result<PathBuf> {
    let key = location.map_or_else(String::new, Location::path_key);
    let resolved = pattern.replace("{location}", &key);
    // Collapse the duplicate separator left by an empty location.
    let resolved = resolved.replace("//", "/");
    let path = PathBuf::from(resolved);
    if mkdir {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(path)
}
