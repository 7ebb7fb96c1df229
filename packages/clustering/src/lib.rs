#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Household clustering for one location.
//!
//! Partitions a location's households into clusters anchored at its
//! village centers: k = number of centers, centroids initialized at the
//! center coordinates, single deterministic fit. The result is three
//! per-location tables (clustered households, cluster centers with
//! computed centroids, cluster counts with a small-cluster flag).

pub mod kmeans;

use std::collections::BTreeMap;
use std::path::PathBuf;

use facility_map_cache::Cache;
use facility_map_models::tables::{self, TableError};
use facility_map_models::{
    CenterRow, ClusterCount, ClusterRow, ColumnSpec, Household, Location, VillageCenter,
};

pub use kmeans::{is_converged, KMeansError, KMeansOutcome};

/// Clustering failure for one location.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// K-means could not run.
    #[error("k-means error: {0}")]
    KMeans(#[from] KMeansError),

    /// Table IO failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Attempted to save an invalid instance.
    #[error("invalid clustered households for '{0}'")]
    Invalid(Location),
}

/// Per-location paths for the three clustering artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPaths {
    pub clusters_file: PathBuf,
    pub centers_file: PathBuf,
    pub counts_file: PathBuf,
}

impl ClusterPaths {
    /// True when all three files exist on disk.
    #[must_use]
    pub fn all_exist(&self) -> bool {
        self.clusters_file.is_file() && self.centers_file.is_file() && self.counts_file.is_file()
    }
}

/// Clustered households and village centers for one location.
///
/// Two states: unconverged (constructed, possibly fitted) and finalized
/// (tables prepared, counts computed). `finalize` is irreversible.
pub struct ClusteredHouseholds {
    location: Location,
    households: Vec<Household>,
    village_centers: Vec<VillageCenter>,
    labels: Vec<usize>,
    centroids: Vec<[f64; 2]>,
    clusters: Vec<ClusterRow>,
    centers: Vec<CenterRow>,
    counts: Vec<ClusterCount>,
    valid: bool,
    converged: bool,
    finalized: bool,
}

impl ClusteredHouseholds {
    /// Constructs an instance over a location's household and
    /// village-center slices.
    #[must_use]
    pub fn new(
        location: Location,
        households: Vec<Household>,
        village_centers: Vec<VillageCenter>,
    ) -> Self {
        let valid = !households.is_empty() && !village_centers.is_empty();
        Self {
            location,
            households,
            village_centers,
            labels: Vec::new(),
            centroids: Vec::new(),
            clusters: Vec::new(),
            centers: Vec::new(),
            counts: Vec::new(),
            valid,
            converged: false,
            finalized: false,
        }
    }

    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// True only if construction succeeded and both tables are
    /// non-empty.
    #[must_use]
    pub fn valid(&self) -> bool {
        if self.finalized {
            self.valid && !self.clusters.is_empty() && !self.centers.is_empty()
        } else {
            self.valid
        }
    }

    /// Marks the instance invalid (e.g. after a failed fit).
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    #[must_use]
    pub const fn converged(&self) -> bool {
        self.converged
    }

    #[must_use]
    pub fn clusters(&self) -> &[ClusterRow] {
        &self.clusters
    }

    #[must_use]
    pub fn clusters_mut(&mut self) -> &mut [ClusterRow] {
        &mut self.clusters
    }

    #[must_use]
    pub fn centers(&self) -> &[CenterRow] {
        &self.centers
    }

    #[must_use]
    pub fn centers_mut(&mut self) -> &mut [CenterRow] {
        &mut self.centers
    }

    /// Splits mutable access to the clusters and centers tables, for
    /// enriching both in one pass.
    #[must_use]
    pub fn tables_mut(&mut self) -> (&mut [ClusterRow], &mut [CenterRow]) {
        (&mut self.clusters, &mut self.centers)
    }

    #[must_use]
    pub fn counts(&self) -> &[ClusterCount] {
        &self.counts
    }

    /// Runs the k-means fit with centroids initialized at the village
    /// center coordinates. Returns the convergence flag.
    ///
    /// # Errors
    ///
    /// Returns an error when the fit cannot run (empty inputs, more
    /// centers than households).
    pub fn cluster(&mut self, max_iter: usize, cache: &Cache) -> Result<bool, ClusterError> {
        let points: Vec<[f64; 2]> = self.households.iter().map(|h| [h.lon, h.lat]).collect();
        let init: Vec<[f64; 2]> = self
            .village_centers
            .iter()
            .map(|c| [c.lon, c.lat])
            .collect();

        let outcome: KMeansOutcome = cache.get_or_compute(
            "kmeans-fit",
            &(&points, &init, max_iter),
            || kmeans::fit(&points, &init, max_iter),
        )?;

        self.labels = outcome.labels;
        self.centroids = outcome.centroids;
        self.converged = outcome.converged;
        if !outcome.converged {
            log::debug!(
                "k-means used the full budget ({} iterations) for '{}'",
                outcome.iterations,
                self.location
            );
        }
        Ok(self.converged)
    }

    /// Irreversibly finalizes the instance: derives the village column
    /// (joined from centers by cluster id when converged, the cluster id
    /// itself when not), locks in sort order and computes cluster counts
    /// with the small flag.
    pub fn finalize(&mut self, converged: bool, threshold_households: u64) {
        self.converged = converged;
        self.prep_centers();
        self.prep_clusters();
        self.calc_counts(threshold_households);
        self.finalized = true;
    }

    fn prep_centers(&mut self) {
        let centers: Vec<CenterRow> = self
            .village_centers
            .iter()
            .enumerate()
            .map(|(cluster, vc)| {
                let centroid = self.centroids.get(cluster).copied().unwrap_or([vc.lon, vc.lat]);
                CenterRow {
                    cluster,
                    adm: vc.adm.clone(),
                    lon: vc.lon,
                    lat: vc.lat,
                    centroid_lon: centroid[0],
                    centroid_lat: centroid[1],
                    optimal: None,
                    baseline: None,
                }
            })
            .collect();
        self.centers = centers;
    }

    fn prep_clusters(&mut self) {
        let village_names: Vec<String> = self
            .village_centers
            .iter()
            .map(|vc| vc.village().to_string())
            .collect();

        let converged = self.converged;
        let clusters: Vec<ClusterRow> = self
            .households
            .iter()
            .zip(&self.labels)
            .map(|(hh, &cluster)| {
                let village = if converged {
                    village_names
                        .get(cluster)
                        .cloned()
                        .unwrap_or_else(|| cluster.to_string())
                } else {
                    // Explicit fallback when unconverged, not an error.
                    cluster.to_string()
                };
                ClusterRow {
                    adm: hh.adm.clone(),
                    village,
                    cluster,
                    lon: hh.lon,
                    lat: hh.lat,
                    optimal: None,
                    baseline: None,
                }
            })
            .collect();
        self.clusters = clusters;

        tables::sort_clusters(&mut self.clusters);
    }

    fn calc_counts(&mut self, threshold_households: u64) {
        let mut grouped: BTreeMap<(Vec<String>, String, usize), u64> = BTreeMap::new();
        for row in &self.clusters {
            *grouped
                .entry((row.adm.clone(), row.village.clone(), row.cluster))
                .or_insert(0) += 1;
        }

        self.counts = grouped
            .into_iter()
            .map(|((adm, village, cluster), counts)| ClusterCount {
                adm,
                village,
                cluster,
                counts,
                small: counts < threshold_households,
            })
            .collect();
    }

    /// Saves the three tables to their per-location files.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Invalid`] for invalid instances, or a
    /// table error on IO failure.
    pub fn save(&self, paths: &ClusterPaths, cols: &ColumnSpec) -> Result<(), ClusterError> {
        if !self.valid() {
            return Err(ClusterError::Invalid(self.location.clone()));
        }
        tables::write_clusters(&paths.clusters_file, &self.clusters, cols)?;
        tables::write_centers(&paths.centers_file, &self.centers, cols)?;
        tables::write_counts(&paths.counts_file, &self.counts, cols)?;
        Ok(())
    }
}

/// Clusters one location's households around its village centers.
///
/// Empty household or center data skips the fit entirely and returns an
/// invalid instance (distinct from "attempted but did not converge").
/// Fit errors also invalidate. Non-convergence logs a warning and still
/// finalizes with the best assignment found.
#[must_use]
pub fn cluster_households_by_centers(
    location: &Location,
    households: Vec<Household>,
    village_centers: Vec<VillageCenter>,
    threshold_households: u64,
    max_iter: usize,
    cache: &Cache,
) -> ClusteredHouseholds {
    let mut ok = true;
    if households.is_empty() {
        log::warn!("No household data for: {location}");
        ok = false;
    }
    if village_centers.is_empty() {
        log::warn!("No village centers data for: {location}");
        ok = false;
    }

    let mut ch = ClusteredHouseholds::new(location.clone(), households, village_centers);

    if !ok {
        log::info!("Skipping clustering for: {location}.");
        return ch;
    }

    let converged = match ch.cluster(max_iter, cache) {
        Ok(converged) => converged,
        Err(e) => {
            log::error!("Failed to cluster households: {location}: {e}");
            ch.invalidate();
            return ch;
        }
    };

    ch.finalize(converged, threshold_households);

    if !converged {
        log::warn!("Clustering has not converged for: '{location}'");
    }

    ch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ColumnSpec {
        ColumnSpec {
            adm_cols: vec!["adm1".into(), "adm2".into()],
            village_col: "village".into(),
            lon_col: "lon".into(),
            lat_col: "lat".into(),
        }
    }

    fn household(adm: &[&str], lon: f64, lat: f64) -> Household {
        Household {
            adm: adm.iter().map(ToString::to_string).collect(),
            lon,
            lat,
        }
    }

    fn center(adm: &[&str], lon: f64, lat: f64) -> VillageCenter {
        VillageCenter {
            adm: adm.iter().map(ToString::to_string).collect(),
            lon,
            lat,
        }
    }

    fn sample_inputs() -> (Vec<Household>, Vec<VillageCenter>) {
        let households = vec![
            household(&["p", "d"], 0.0, 0.0),
            household(&["p", "d"], 0.1, 0.0),
            household(&["p", "d"], 0.0, 0.1),
            household(&["p", "d"], 5.0, 5.0),
            household(&["p", "d"], 5.1, 5.1),
        ];
        let centers = vec![
            center(&["p", "d", "near"], 0.05, 0.05),
            center(&["p", "d", "far"], 5.05, 5.05),
        ];
        (households, centers)
    }

    #[test]
    fn clusters_and_finalizes_with_village_names() {
        let (households, centers) = sample_inputs();
        let loc = Location::parse("p:d");
        let ch = cluster_households_by_centers(&loc, households, centers, 3, 300, &Cache::memory());

        assert!(ch.valid());
        assert!(ch.converged());
        assert_eq!(ch.clusters().len(), 5);
        assert_eq!(ch.centers().len(), 2);
        assert_eq!(ch.counts().len(), 2);

        // Cluster 0 holds the three near points, named after its center.
        let near: Vec<_> = ch.clusters().iter().filter(|r| r.cluster == 0).collect();
        assert_eq!(near.len(), 3);
        assert!(near.iter().all(|r| r.village == "near"));

        // Centroids are the data means, not the original center points.
        let c0 = &ch.centers()[0];
        assert!((c0.centroid_lon - 0.033_333).abs() < 1e-3);
        assert!((c0.lon - 0.05).abs() < 1e-12);
    }

    #[test]
    fn empty_households_skip_clustering_as_invalid() {
        let loc = Location::parse("p:d");
        let centers = vec![center(&["p", "d", "v"], 0.0, 0.0)];
        let ch = cluster_households_by_centers(&loc, Vec::new(), centers, 3, 300, &Cache::memory());
        assert!(!ch.valid());
        assert!(!ch.converged());
    }

    #[test]
    fn unconverged_falls_back_to_cluster_id_names() {
        let (households, centers) = sample_inputs();
        let loc = Location::parse("p:d");
        // A one-iteration budget cannot be observed as stable.
        let ch = cluster_households_by_centers(&loc, households, centers, 3, 1, &Cache::memory());
        assert!(ch.valid());
        assert!(!ch.converged());
        assert!(ch
            .clusters()
            .iter()
            .all(|r| r.village == r.cluster.to_string()));
    }

    #[test]
    fn small_cluster_flag_respects_threshold_boundary() {
        let (households, centers) = sample_inputs();
        let loc = Location::parse("p:d");
        // Threshold 3: the 3-household cluster is not small (3 >= 3),
        // the 2-household cluster is (2 < 3).
        let ch = cluster_households_by_centers(&loc, households, centers, 3, 300, &Cache::memory());
        let by_cluster: std::collections::BTreeMap<usize, &ClusterCount> =
            ch.counts().iter().map(|c| (c.cluster, c)).collect();
        assert_eq!(by_cluster[&0].counts, 3);
        assert!(!by_cluster[&0].small);
        assert_eq!(by_cluster[&1].counts, 2);
        assert!(by_cluster[&1].small);
    }

    #[test]
    fn save_writes_three_files_and_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ClusterPaths {
            clusters_file: dir.path().join("clusters.csv"),
            centers_file: dir.path().join("centers.csv"),
            counts_file: dir.path().join("counts.csv"),
        };

        let (households, centers) = sample_inputs();
        let loc = Location::parse("p:d");
        let ch = cluster_households_by_centers(&loc, households, centers, 3, 300, &Cache::memory());
        ch.save(&paths, &spec()).unwrap();
        assert!(paths.all_exist());

        let invalid =
            cluster_households_by_centers(&loc, Vec::new(), Vec::new(), 3, 300, &Cache::memory());
        assert!(matches!(
            invalid.save(&paths, &spec()),
            Err(ClusterError::Invalid(_))
        ));
    }
}
