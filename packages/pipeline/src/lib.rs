#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Per-location processing pipeline.
//!
//! Drives the stages in strict order: cluster -> validate ->
//! outline+place(+distance) -> merge. Locations are processed in
//! parallel on a rayon pool; a failed location drops out of downstream
//! stages without halting the others. Cancellation is cooperative and
//! reported as "stopped", distinct from failure.

mod progress;
mod thresholds;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use facility_map_cache::Cache;
use facility_map_clustering::{
    cluster_households_by_centers, ClusterError, ClusterPaths, ClusteredHouseholds,
};
use facility_map_config::{location_path, Config, ConfigError};
use facility_map_distance::{ecdf_km, enrich_distances, EcdfPoint};
use facility_map_models::cancel::{CancelToken, Cancelled};
use facility_map_models::progress::ProgressCallback;
use facility_map_models::tables::{self, TableError};
use facility_map_models::{Facility, Location, ResultFiles};
use facility_map_outlines::OutlineError;
use facility_map_placement::PlacementError;
use facility_map_spatial::{BoundaryIndex, SpatialError};
use geo::MultiPolygon;
use rayon::prelude::*;

use progress::StageProgress;
pub use thresholds::{check_thresholds, ThresholdReport};

/// File name of the merged distance-coverage table for optimal
/// facilities.
pub const COVERAGE_OPTIMAL: &str = "population_coverage_optimal.csv";

/// File name of the merged distance-coverage table for baseline
/// facilities.
pub const COVERAGE_BASELINE: &str = "population_coverage_baseline.csv";

/// Pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Table IO failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Geometry layer failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Outline/merge step failed.
    #[error(transparent)]
    Outline(#[from] OutlineError),

    /// Clustering step failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Placement step failed.
    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// File IO failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run was stopped by the user.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Outcome of a full processing run.
pub struct ProcessSummary {
    /// Merged result files; `None` when no location succeeded or the
    /// run was stopped.
    pub result: Option<ResultFiles>,
    /// Locations that failed a stage, by name.
    pub failed: Vec<Location>,
    /// True when the run was stopped by the user.
    pub stopped: bool,
}

/// Shared context for one processing run.
pub struct Pipeline<'a> {
    cfg: &'a Config,
    cancel: &'a CancelToken,
    cache: &'a Cache,
    progress: Arc<dyn ProgressCallback>,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        cfg: &'a Config,
        cancel: &'a CancelToken,
        cache: &'a Cache,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        Self {
            cfg,
            cancel,
            cache,
            progress,
        }
    }

    /// Runs the full pipeline for the configured locations.
    ///
    /// Per-location failures collect into the summary's failed list;
    /// cancellation cleans up partial outputs for the in-progress stage
    /// and reports the run as stopped. Only fatal errors propagate.
    ///
    /// # Errors
    ///
    /// Returns an error on fatal failures (unreadable inputs, IO
    /// failures on merged artifacts).
    pub fn process_locations(&self) -> Result<ProcessSummary, PipelineError> {
        let locations = self.cfg.locations();
        if locations.is_empty() {
            log::warn!("No locations to process.");
            return Ok(ProcessSummary {
                result: None,
                failed: Vec::new(),
                stopped: false,
            });
        }

        let outcome = self.run_stages(&locations);
        match outcome {
            Err(PipelineError::Cancelled(_)) => Ok(ProcessSummary {
                result: None,
                failed: Vec::new(),
                stopped: true,
            }),
            other => other,
        }
    }

    fn run_stages(&self, locations: &[Location]) -> Result<ProcessSummary, PipelineError> {
        log::info!("Starting household clustering...");
        let clustered = self.cluster_households(locations)?;
        log::info!("Completed household clustering.");

        let (valid, mut failed) = self.validate_clusters(clustered, locations)?;

        log::info!("Starting optimal placement...");
        let results = self.outline_and_place(valid)?;
        log::info!("Completed optimal placement.");

        let mut succeeded = BTreeMap::new();
        for (location, result) in results {
            match result {
                Some(files) => {
                    succeeded.insert(location, files);
                }
                None => failed.push(location),
            }
        }

        self.cancel.check()?;
        let result = self.process_results(&succeeded)?;
        log::info!("Completed merging results.");

        Ok(ProcessSummary {
            result,
            failed,
            stopped: false,
        })
    }

    fn cluster_paths(&self, location: &Location) -> Result<ClusterPaths, PipelineError> {
        let clusters = &self.cfg.results.clusters;
        Ok(ClusterPaths {
            clusters_file: location_path(&clusters.file, Some(location), true)?,
            centers_file: location_path(&clusters.centers_file, Some(location), true)?,
            counts_file: location_path(&clusters.counts_file, Some(location), true)?,
        })
    }

    /// Stage 1: clusters every location's households around its village
    /// centers, one pool task per location, saving each valid result to
    /// its per-location files.
    ///
    /// # Errors
    ///
    /// Returns an error if the prepared inputs cannot be read or on
    /// cancellation.
    #[allow(clippy::cast_possible_truncation)]
    pub fn cluster_households(
        &self,
        locations: &[Location],
    ) -> Result<Vec<(Location, ClusteredHouseholds)>, PipelineError> {
        log::info!("Clustering households for locations: {}", locations.len());
        let cols = self.cfg.column_spec();

        let households = tables::read_households(&self.cfg.inputs.households.file, &cols)?;
        let centers =
            tables::read_village_centers(&self.cfg.inputs.village_centers.file, &cols)?;

        self.cancel.check()?;
        let stage = StageProgress::new("Clustering", locations.len());
        self.progress.set_message("Clustering households".to_string());
        self.progress.set_total(locations.len() as u64);

        let clustered: Vec<(Location, ClusteredHouseholds)> = locations
            .par_iter()
            .filter_map(|location| {
                if self.cancel.is_stopped() {
                    return None;
                }

                let hh: Vec<_> = households
                    .iter()
                    .filter(|h| location.matches(&h.adm))
                    .cloned()
                    .collect();
                let vc: Vec<_> = centers
                    .iter()
                    .filter(|c| location.matches(&c.adm[..c.adm.len() - 1]))
                    .cloned()
                    .collect();

                let ch = cluster_households_by_centers(
                    location,
                    hh,
                    vc,
                    self.cfg.args.threshold_households,
                    self.cfg.args.kmeans_max_iter,
                    self.cache,
                );

                if self.cancel.is_stopped() {
                    return None;
                }

                if ch.valid() {
                    let saved = self
                        .cluster_paths(location)
                        .and_then(|paths| ch.save(&paths, &cols).map_err(PipelineError::from));
                    if let Err(e) = saved {
                        // Validation will catch the missing files and
                        // mark the location failed.
                        log::error!("Failed to save clusters for {location}: {e}");
                    }
                }

                stage.tick(self.progress.as_ref());
                Some((location.clone(), ch))
            })
            .collect();

        if self.cancel.is_stopped() {
            self.cleanup_partial_clusters(locations, &clustered);
            return Err(Cancelled.into());
        }

        log::debug!(
            "Clustering stage finished {} of {} locations.",
            stage.done(),
            locations.len()
        );
        Ok(clustered)
    }

    /// Removes per-location cluster files for locations whose stage did
    /// not run to completion before the stop.
    fn cleanup_partial_clusters(
        &self,
        locations: &[Location],
        completed: &[(Location, ClusteredHouseholds)],
    ) {
        for location in locations {
            if completed.iter().any(|(loc, _)| loc == location) {
                continue;
            }
            if let Ok(paths) = self.cluster_paths(location) {
                for file in [&paths.clusters_file, &paths.centers_file, &paths.counts_file] {
                    let _ = fs::remove_file(file);
                }
            }
        }
    }

    /// Stage 2: validates that each clustered result is marked valid
    /// and that all three of its files made it to disk.
    ///
    /// Failed locations are listed in the failed-locations file.
    ///
    /// # Errors
    ///
    /// Returns an error if the failed-locations file cannot be written.
    #[allow(clippy::type_complexity)]
    pub fn validate_clusters(
        &self,
        clustered: Vec<(Location, ClusteredHouseholds)>,
        locations: &[Location],
    ) -> Result<(Vec<(Location, ClusteredHouseholds)>, Vec<Location>), PipelineError> {
        let mut valid = Vec::new();
        let mut failed: Vec<Location> = Vec::new();

        // Locations that produced no result at all count as failed.
        for location in locations {
            if !clustered.iter().any(|(loc, _)| loc == location) {
                failed.push(location.clone());
            }
        }

        for (location, ch) in clustered {
            if ch.valid() && self.cluster_paths(&location)?.all_exist() {
                valid.push((location, ch));
            } else {
                failed.push(location);
            }
        }

        if !failed.is_empty() {
            let file = self.cfg.failed_locations_file();
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
            let text: Vec<String> = failed.iter().map(ToString::to_string).collect();
            fs::write(&file, text.join("\n"))?;
            log::warn!("{} locations failed clustering.", failed.len());
        }

        Ok((valid, failed))
    }

    /// Stage 3: builds cluster shapes, places facilities, measures and
    /// persists distances for every valid location in parallel.
    ///
    /// A location returning `None` is treated as failed, not fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary file or baseline facilities
    /// cannot be read, or on cancellation.
    #[allow(clippy::type_complexity, clippy::cast_possible_truncation)]
    pub fn outline_and_place(
        &self,
        valid: Vec<(Location, ClusteredHouseholds)>,
    ) -> Result<Vec<(Location, Option<ResultFiles>)>, PipelineError> {
        let index =
            BoundaryIndex::load(&self.cfg.inputs.shapes.file, &self.cfg.inputs.shapes.adm_cols)?;
        let baseline = self.read_baseline()?;

        self.cancel.check()?;
        let stage = StageProgress::new("Placement", valid.len());
        self.progress.set_message("Outlining and placing".to_string());
        self.progress.set_total(valid.len() as u64);

        let results: Vec<(Location, Option<ResultFiles>)> = valid
            .into_par_iter()
            .filter_map(|(location, ch)| {
                if self.cancel.is_stopped() {
                    return None;
                }
                log::debug!("Outlining and placing for: {location}...");

                let result = self
                    .outline_and_place_one(&location, ch, &index, baseline.as_deref())
                    .unwrap_or_else(|e| {
                        // Per-location failures convert to list
                        // membership at this boundary.
                        log::error!("Outline/place failed for {location}: {e}");
                        None
                    });

                stage.tick(self.progress.as_ref());
                Some((location, result))
            })
            .collect();

        if self.cancel.is_stopped() {
            return Err(Cancelled.into());
        }
        log::debug!("Placement stage finished {} locations.", stage.done());
        Ok(results)
    }

    fn read_baseline(&self) -> Result<Option<Vec<Facility>>, PipelineError> {
        if !self.cfg.has_baseline() {
            return Ok(None);
        }
        let Some(path) = &self.cfg.inputs.baseline_facilities_file else {
            return Ok(None);
        };
        if !path.is_file() {
            log::warn!("Baseline configured but not prepared: {}", path.display());
            return Ok(None);
        }
        Ok(Some(tables::read_facilities(path, &self.cfg.column_spec())?))
    }

    /// Builds the location's boundary from every admin polygon under
    /// its path.
    fn location_boundary(index: &BoundaryIndex, location: &Location) -> MultiPolygon<f64> {
        let polygons: Vec<_> = index
            .features()
            .filter(|f| location.matches(f.adm()))
            .flat_map(|f| f.polygon().0.iter().cloned())
            .collect();
        MultiPolygon(polygons)
    }

    fn outline_and_place_one(
        &self,
        location: &Location,
        mut ch: ClusteredHouseholds,
        index: &BoundaryIndex,
        baseline: Option<&[Facility]>,
    ) -> Result<Option<ResultFiles>, PipelineError> {
        let cols = self.cfg.column_spec();
        let paths = self.cluster_paths(location)?;

        // Empty or unreadable clustered households are a per-location
        // failure, distinct from an invalid clustering result.
        if !(ch.valid() && paths.clusters_file.is_file()) {
            return Ok(None);
        }
        let rows = tables::read_clusters(&paths.clusters_file, &cols)?;
        if rows.is_empty() {
            return Ok(None);
        }

        let boundary = Self::location_boundary(index, location);
        if boundary.0.is_empty() {
            log::warn!("No admin boundary found for: {location}");
            return Ok(None);
        }

        // Cluster (village) shapes, clipped to the admin boundary.
        let shapes = facility_map_outlines::build_cluster_shapes(&boundary, &rows, ch.counts());
        let shapes_file = location_path(&self.cfg.results.shapes_file, Some(location), true)?;
        facility_map_outlines::export_shapes(&shapes, &shapes_file, &cols)?;
        log::debug!("Completed creating cluster shapes for: {location}.");

        // Optimal facility placement.
        let facilities = facility_map_placement::place_facilities(
            &rows,
            location,
            self.cfg.results.facilities.n_facilities,
            self.cfg.args.kmeans_max_iter,
            self.cache,
        )?;
        log::debug!("Completed facility placement for: {location}.");

        // Distances from households/centroids to assigned facilities.
        let baseline_local: Option<Vec<Facility>> = baseline.map(|all| {
            all.iter()
                .filter(|f| location.matches(&f.adm))
                .cloned()
                .collect()
        });
        let (clusters, centers) = ch.tables_mut();
        enrich_distances(clusters, centers, &facilities, baseline_local.as_deref());

        tables::write_clusters(&paths.clusters_file, ch.clusters(), &cols)?;
        tables::write_centers(&paths.centers_file, ch.centers(), &cols)?;
        log::debug!("Completed distance calculations for: {location}.");

        self.cancel.check()?;

        // Distance-coverage tables consumed by the visualization layer.
        let optimal_csv = paths
            .clusters_file
            .with_file_name(COVERAGE_OPTIMAL);
        write_ecdf_csv(
            &optimal_csv,
            &ecdf_km(ch.clusters().iter().filter_map(|r| {
                r.optimal.as_ref().map(|d| d.minkowski)
            })),
        )?;
        if baseline_local.is_some() {
            let baseline_csv = paths
                .clusters_file
                .with_file_name(COVERAGE_BASELINE);
            write_ecdf_csv(
                &baseline_csv,
                &ecdf_km(ch.clusters().iter().filter_map(|r| {
                    r.baseline.as_ref().map(|d| d.minkowski)
                })),
            )?;
        }

        // Recommended facilities, last of the five artifacts.
        let facilities_file =
            location_path(&self.cfg.results.facilities.file, Some(location), true)?;
        tables::write_facilities(&facilities_file, &facilities, &cols)?;
        log::debug!("Completed outlining and placing for: {location}.");

        Ok(Some(ResultFiles {
            shapes_file,
            clusters_file: paths.clusters_file,
            centers_file: paths.centers_file,
            counts_file: paths.counts_file,
            facilities_file,
        }))
    }

    /// Stage 4: merges all successful locations into the global
    /// artifacts and validates the household-per-cluster thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge or the stats persistence fails.
    pub fn process_results(
        &self,
        results: &BTreeMap<Location, ResultFiles>,
    ) -> Result<Option<ResultFiles>, PipelineError> {
        if results.is_empty() {
            log::warn!("No results found.");
            return Ok(None);
        }

        let cols = self.cfg.column_spec();
        let merged = ResultFiles {
            shapes_file: location_path(&self.cfg.results.shapes_file, None, true)?,
            clusters_file: location_path(&self.cfg.results.clusters.file, None, true)?,
            centers_file: location_path(&self.cfg.results.clusters.centers_file, None, true)?,
            counts_file: location_path(&self.cfg.results.clusters.counts_file, None, true)?,
            facilities_file: location_path(&self.cfg.results.facilities.file, None, true)?,
        };
        let merged = facility_map_outlines::merge_results(results, &merged, &cols)?;

        // Overall population coverage tables plus threshold validation.
        let clusters = tables::read_clusters(&merged.clusters_file, &cols)?;
        let out_dir = merged
            .clusters_file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        write_ecdf_csv(
            &out_dir.join(COVERAGE_OPTIMAL),
            &ecdf_km(clusters.iter().filter_map(|r| {
                r.optimal.as_ref().map(|d| d.minkowski)
            })),
        )?;
        if self.cfg.has_baseline() {
            write_ecdf_csv(
                &out_dir.join(COVERAGE_BASELINE),
                &ecdf_km(clusters.iter().filter_map(|r| {
                    r.baseline.as_ref().map(|d| d.minkowski)
                })),
            )?;
        }

        let report = check_thresholds(
            &clusters,
            self.cfg.args.threshold_households,
            self.cfg.args.threshold_village_perc,
        );
        report.log();
        report.save(&out_dir)?;

        Ok(Some(merged))
    }
}

/// Writes an ECDF table as a two-column CSV.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
fn write_ecdf_csv(path: &Path, points: &[EcdfPoint]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path).map_err(TableError::from)?;
    wtr.write_record(["minkowski_km", "cumulative_perc"])
        .map_err(TableError::from)?;
    for point in points {
        wtr.write_record([
            point.distance_km.to_string(),
            point.cumulative_perc.to_string(),
        ])
        .map_err(TableError::from)?;
    }
    wtr.flush().map_err(PipelineError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_map_models::progress::null_progress;
    use facility_map_spatial::geojson_io;

    fn sample_config(dir: &Path) -> Config {
        let dir = dir.display();
        let toml = format!(
            r#"
[args]
threshold_households = 3
threshold_village_perc = 60.0
chunk_size = 1000

[args.village_centers]
file = "{dir}/user/villages.csv"
village_col = "name"
xy_cols = ["x", "y"]

[inputs]
all_locations_file = "{dir}/inputs/locations.csv"
xy_cols = ["lon", "lat"]

[inputs.buildings]
file = "{dir}/inputs/buildings.csv"
xy_cols = ["longitude", "latitude"]

[inputs.shapes]
file = "{dir}/inputs/shapes.geojson"
adm_cols = ["adm1", "adm2", "adm3"]

[inputs.households]
file = "{dir}/inputs/households.csv"
adm_cols = ["adm1", "adm2", "adm3"]

[inputs.village_centers]
file = "{dir}/inputs/village_centers.csv"
adm_cols = ["adm1", "adm2", "adm3", "village"]

[results]
dir = "{dir}/results"
shapes_file = "{dir}/results/{{location}}/cluster_shapes.geojson"

[results.clusters]
file = "{dir}/results/{{location}}/clustered_households.csv"
centers_file = "{dir}/results/{{location}}/cluster_centers.csv"
counts_file = "{dir}/results/{{location}}/cluster_counts.csv"

[results.facilities]
file = "{dir}/results/{{location}}/facilities.csv"
n_facilities = 1
"#
        );
        Config::from_toml_str(&toml).unwrap()
    }

    fn write_shapes(path: &Path) {
        use geo::polygon;
        let squares = [("west", 0.0), ("east", 1.0)];
        let features: Vec<geojson_io::ShapeFeature> = squares
            .iter()
            .map(|(adm3, x0)| {
                let mut properties = serde_json::Map::new();
                properties.insert("adm1".into(), "p".into());
                properties.insert("adm2".into(), "d".into());
                properties.insert("adm3".into(), (*adm3).into());
                geojson_io::ShapeFeature {
                    properties,
                    geometry: geo::Geometry::Polygon(polygon![
                        (x: *x0, y: 0.0),
                        (x: *x0 + 1.0, y: 0.0),
                        (x: *x0 + 1.0, y: 1.0),
                        (x: *x0, y: 1.0),
                        (x: *x0, y: 0.0),
                    ]),
                }
            })
            .collect();
        geojson_io::write_features(path, &features).unwrap();
    }

    /// Five buildings across two admin groups: four in `west`, one in
    /// `east`, plus one village center per group.
    fn prepare_fixture(dir: &Path) -> Config {
        let cfg = sample_config(dir);
        write_shapes(&cfg.inputs.shapes.file);

        fs::create_dir_all(cfg.inputs.buildings.file.parent().unwrap()).unwrap();
        fs::write(
            &cfg.inputs.buildings.file,
            "longitude,latitude\n\
             0.2,0.2\n\
             0.8,0.2\n\
             0.5,0.8\n\
             0.3,0.6\n\
             1.5,0.5\n",
        )
        .unwrap();

        fs::create_dir_all(cfg.args.village_centers.file.parent().unwrap()).unwrap();
        fs::write(
            &cfg.args.village_centers.file,
            "name,x,y\nWest Village,0.5,0.4\nEast Village,1.5,0.5\n",
        )
        .unwrap();

        let cancel = CancelToken::new();
        let cache = Cache::memory();
        facility_map_prep::prepare_inputs(&cfg, &cancel, &cache).unwrap();
        cfg
    }

    #[test]
    fn two_location_scenario_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = prepare_fixture(tmp.path());

        let cancel = CancelToken::new();
        let cache = Cache::memory();
        let pipeline = Pipeline::new(&cfg, &cancel, &cache, null_progress());

        // Stage by stage: two valid, converged clusterings with counts.
        let locations = cfg.locations();
        assert_eq!(locations.len(), 2);
        let clustered = pipeline.cluster_households(&locations).unwrap();
        assert_eq!(clustered.len(), 2);
        for (_, ch) in &clustered {
            assert!(ch.valid());
            assert!(ch.converged());
            assert!(!ch.counts().is_empty());
        }

        let (valid, failed) = pipeline.validate_clusters(clustered, &locations).unwrap();
        assert_eq!(valid.len(), 2);
        assert!(failed.is_empty());

        let results = pipeline.outline_and_place(valid).unwrap();
        assert_eq!(results.len(), 2);
        for (location, files) in &results {
            let files = files.as_ref().unwrap_or_else(|| panic!("{location} failed"));
            assert!(files.all_exist());

            // Non-empty polygon shapes: the 4-point cluster hulls into a
            // polygon, the single-point cluster grows into a square.
            let shapes = geojson_io::read_features(&files.shapes_file).unwrap();
            assert!(!shapes.is_empty(), "{location} has no shapes");

            let facilities = tables::read_facilities(&files.facilities_file, &cfg.column_spec())
                .unwrap();
            assert!(!facilities.is_empty(), "{location} has no facilities");
            assert!(facilities.iter().all(|f| !f.plus.is_empty()));
        }
    }

    #[test]
    fn full_run_merges_and_measures_distances() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = prepare_fixture(tmp.path());

        let cancel = CancelToken::new();
        let cache = Cache::memory();
        let pipeline = Pipeline::new(&cfg, &cancel, &cache, null_progress());

        let summary = pipeline.process_locations().unwrap();
        assert!(!summary.stopped);
        assert!(summary.failed.is_empty());
        let merged = summary.result.unwrap();
        assert!(merged.all_exist());

        let cols = cfg.column_spec();
        let clusters = tables::read_clusters(&merged.clusters_file, &cols).unwrap();
        assert_eq!(clusters.len(), 5);

        // Every household is assigned a facility with measured distances.
        for row in &clusters {
            let d = row.optimal.as_ref().expect("missing distance block");
            assert!(d.minkowski >= d.euclidean);
            assert!(!d.assigned_id.is_empty());
        }

        // The merged table is sorted by its full column order.
        let mut resorted = clusters.clone();
        tables::sort_clusters_merged(&mut resorted);
        assert_eq!(resorted, clusters);

        // Coverage and stats tables land next to the merged clusters.
        let out_dir = merged.clusters_file.parent().unwrap();
        assert!(out_dir.join(COVERAGE_OPTIMAL).is_file());
        assert!(out_dir.join("cluster_stats.csv").is_file());
    }

    #[test]
    fn location_without_households_fails_without_halting_others() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = prepare_fixture(tmp.path());

        // A village center in a location with no buildings at all.
        let cols = cfg.column_spec();
        let mut centers =
            tables::read_village_centers(&cfg.inputs.village_centers.file, &cols).unwrap();
        centers.push(facility_map_models::VillageCenter {
            adm: vec!["p".into(), "d".into(), "north".into(), "Ghost".into()],
            lon: 0.5,
            lat: 3.5,
        });
        tables::write_village_centers(&cfg.inputs.village_centers.file, &centers, &cols).unwrap();
        let mut text = fs::read_to_string(&cfg.inputs.all_locations_file).unwrap();
        text.push_str("\np:d:north");
        fs::write(&cfg.inputs.all_locations_file, text).unwrap();

        let cancel = CancelToken::new();
        let cache = Cache::memory();
        let pipeline = Pipeline::new(&cfg, &cancel, &cache, null_progress());

        let summary = pipeline.process_locations().unwrap();
        assert_eq!(summary.failed, vec![Location::parse("p:d:north")]);
        assert!(summary.result.is_some());
        assert!(cfg.failed_locations_file().is_file());
    }

    #[test]
    fn stop_requests_report_stopped_not_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = prepare_fixture(tmp.path());

        let cancel = CancelToken::new();
        cancel.stop();
        let cache = Cache::memory();
        let pipeline = Pipeline::new(&cfg, &cancel, &cache, null_progress());

        let summary = pipeline.process_locations().unwrap();
        assert!(summary.stopped);
        assert!(summary.result.is_none());
        assert!(summary.failed.is_empty());
    }
}
