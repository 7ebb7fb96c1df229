#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Domain records shared across the facility map pipeline.
//!
//! Every derived table carries administrative-path values under the
//! canonical column names from configuration. Input files may use
//! different names; those are renamed at the read boundary and never
//! downstream, so all crates agree on one set of columns end-to-end.

pub mod cancel;
pub mod progress;
pub mod status;
pub mod tables;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A hierarchical administrative path (e.g. province:district:commune).
///
/// Used as the unit of parallel processing and as a file-naming key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location(pub Vec<String>);

impl Location {
    /// Parses a colon-delimited location string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        Self(s.trim().split(':').map(str::to_string).collect())
    }

    /// Returns the location as a path fragment (`:` replaced with `/`).
    #[must_use]
    pub fn path_key(&self) -> String {
        self.0.join("/")
    }

    /// True when the location's admin values match the leading admin
    /// values of `adm` exactly.
    #[must_use]
    pub fn matches(&self, adm: &[String]) -> bool {
        self.0.len() <= adm.len() && self.0.iter().zip(adm).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

/// Canonical column names for tabular artifacts.
///
/// `adm_cols` excludes the village column; village-center and facility
/// tables append `village_col` after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub adm_cols: Vec<String>,
    pub village_col: String,
    pub lon_col: String,
    pub lat_col: String,
}

impl ColumnSpec {
    /// Admin columns followed by the village column, the layout used by
    /// village-center and cluster-center tables.
    #[must_use]
    pub fn adm_village_cols(&self) -> Vec<String> {
        let mut cols = self.adm_cols.clone();
        cols.push(self.village_col.clone());
        cols
    }
}

/// One derived household: a building point annotated with its admin path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub adm: Vec<String>,
    pub lon: f64,
    pub lat: f64,
}

/// One named village/locality center supplied by the user, annotated
/// with its admin path. The last element of `adm` is the village name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VillageCenter {
    pub adm: Vec<String>,
    pub lon: f64,
    pub lat: f64,
}

impl VillageCenter {
    /// The village name (last admin element).
    #[must_use]
    pub fn village(&self) -> &str {
        self.adm.last().map_or("", String::as_str)
    }

    /// The location part of the admin path (all but the village name).
    #[must_use]
    pub fn location(&self) -> Location {
        let n = self.adm.len().saturating_sub(1);
        Location(self.adm[..n].to_vec())
    }
}

/// Distances from a point to its assigned (nearest) facility.
///
/// Serialized as `{prefix}_assigned_id`, `{prefix}_euclidean` and
/// `{prefix}_minkowski` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityDistance {
    pub assigned_id: String,
    pub euclidean: f64,
    pub minkowski: f64,
}

/// A household tagged with its cluster and (once finalized) village name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub adm: Vec<String>,
    pub village: String,
    pub cluster: usize,
    pub lon: f64,
    pub lat: f64,
    /// Distance to the assigned optimal facility (`hh` prefix).
    pub optimal: Option<FacilityDistance>,
    /// Distance to the assigned baseline facility (`baseline_hh` prefix).
    pub baseline: Option<FacilityDistance>,
}

/// A village center with its cluster id and the computed cluster
/// centroid, which is distinct from the original center coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterRow {
    pub cluster: usize,
    /// Admin path including the village name as the last element.
    pub adm: Vec<String>,
    pub lon: f64,
    pub lat: f64,
    pub centroid_lon: f64,
    pub centroid_lat: f64,
    /// Distance to the assigned optimal facility (`village` prefix).
    pub optimal: Option<FacilityDistance>,
    /// Distance to the assigned baseline facility (`baseline_village` prefix).
    pub baseline: Option<FacilityDistance>,
}

/// Per-cluster household count with the small-cluster flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCount {
    pub adm: Vec<String>,
    pub village: String,
    pub cluster: usize,
    pub counts: u64,
    /// True when `counts` is strictly below the configured household
    /// threshold.
    pub small: bool,
}

/// One recommended facility point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub adm: Vec<String>,
    pub village: String,
    pub lon: f64,
    pub lat: f64,
    /// Open Location Code for the point.
    pub plus: String,
    /// Globally unique id: `{location}_{index}`.
    pub facility_id: String,
}

/// The fixed quintuple of artifact paths produced per location and,
/// after merging, globally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFiles {
    pub shapes_file: PathBuf,
    pub clusters_file: PathBuf,
    pub centers_file: PathBuf,
    pub counts_file: PathBuf,
    pub facilities_file: PathBuf,
}

impl ResultFiles {
    /// True when all five artifact files exist on disk.
    #[must_use]
    pub fn all_exist(&self) -> bool {
        self.shapes_file.is_file()
            && self.clusters_file.is_file()
            && self.centers_file.is_file()
            && self.counts_file.is_file()
            && self.facilities_file.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_parse_display_roundtrip() {
        let loc = Location::parse("Boucle du Mouhoun:Bale:Bagassi");
        assert_eq!(loc.0.len(), 3);
        assert_eq!(loc.to_string(), "Boucle du Mouhoun:Bale:Bagassi");
        assert_eq!(loc.path_key(), "Boucle du Mouhoun/Bale/Bagassi");
    }

    #[test]
    fn location_matches_prefix() {
        let loc = Location::parse("a:b");
        assert!(loc.matches(&["a".into(), "b".into(), "c".into()]));
        assert!(!loc.matches(&["a".into(), "x".into(), "c".into()]));
        assert!(!loc.matches(&["a".into()]));
    }

    #[test]
    fn village_center_splits_name_from_location() {
        let vc = VillageCenter {
            adm: vec!["p".into(), "d".into(), "c".into(), "v".into()],
            lon: 0.0,
            lat: 0.0,
        };
        assert_eq!(vc.village(), "v");
        assert_eq!(vc.location().to_string(), "p:d:c");
    }
}
