#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Recommended facility placement.
//!
//! For every (admin path, village, cluster) group of households, selects
//! the configured number of representative points by running k-means
//! over the group, minimizing intra-cluster distance. Groups too small
//! to cluster pass their raw points through unchanged.

use std::collections::BTreeMap;

use facility_map_cache::Cache;
use facility_map_clustering::kmeans;
use facility_map_models::{ClusterRow, Facility, Location};
use facility_map_spatial::pluscode;

/// Minimum group size for running k-means; smaller groups return their
/// raw points as facilities.
const MIN_CLUSTER_POINTS: usize = 3;

/// Placement failure.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    /// K-means could not run on a group that met the size threshold.
    #[error("k-means error: {0}")]
    KMeans(#[from] kmeans::KMeansError),
}

/// Recommends facility placements for one location's clustered
/// households.
///
/// Groups with at least [`MIN_CLUSTER_POINTS`] households run a
/// deterministic k-means with `k = min(n_facilities, group size)`;
/// non-convergence logs a warning and keeps the best-effort centroids.
/// Smaller groups return their raw points unchanged (degenerate-case
/// policy, not an error). Every output point gets a plus code and a
/// `{location}_{index}` id with a location-wide sequential index.
///
/// # Errors
///
/// Returns an error only when a fit that should run cannot.
pub fn place_facilities(
    clusters: &[ClusterRow],
    location: &Location,
    n_facilities: usize,
    max_iter: usize,
    cache: &Cache,
) -> Result<Vec<Facility>, PlacementError> {
    let mut grouped: BTreeMap<(Vec<String>, String, usize), Vec<[f64; 2]>> = BTreeMap::new();
    for row in clusters {
        grouped
            .entry((row.adm.clone(), row.village.clone(), row.cluster))
            .or_default()
            .push([row.lon, row.lat]);
    }

    let mut facilities = Vec::new();
    let mut index = 0_usize;

    for ((adm, village, _cluster), points) in grouped {
        let centers = if points.len() >= MIN_CLUSTER_POINTS {
            let k = n_facilities.min(points.len());
            let init = kmeans::spread_init(&points, k);
            let outcome: kmeans::KMeansOutcome = cache.get_or_compute(
                "placement-fit",
                &(&points, k, max_iter, location),
                || kmeans::fit(&points, &init, max_iter),
            )?;
            if !outcome.converged {
                log::warn!("Clustering facilities didn't converge for: {location}");
            }
            outcome.centroids
        } else {
            points
        };

        for [lon, lat] in centers {
            facilities.push(Facility {
                adm: adm.clone(),
                village: village.clone(),
                lon,
                lat,
                plus: pluscode::encode(lat, lon),
                facility_id: format!("{location}_{index}"),
            });
            index += 1;
        }
    }

    Ok(facilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(village: &str, cluster: usize, lon: f64, lat: f64) -> ClusterRow {
        ClusterRow {
            adm: vec!["p".into(), "d".into()],
            village: village.into(),
            cluster,
            lon,
            lat,
            optimal: None,
            baseline: None,
        }
    }

    #[test]
    fn two_point_cluster_passes_points_through() {
        let rows = vec![row("v", 0, 1.0, 1.0), row("v", 0, 2.0, 2.0)];
        let loc = Location::parse("p:d");
        let facilities =
            place_facilities(&rows, &loc, 5, 300, &Cache::memory()).unwrap();

        assert_eq!(facilities.len(), 2);
        let coords: Vec<(f64, f64)> = facilities.iter().map(|f| (f.lon, f.lat)).collect();
        assert!(coords.contains(&(1.0, 1.0)));
        assert!(coords.contains(&(2.0, 2.0)));
    }

    #[test]
    fn three_point_cluster_runs_kmeans() {
        let rows = vec![
            row("v", 0, 0.0, 0.0),
            row("v", 0, 1.0, 0.0),
            row("v", 0, 2.0, 0.0),
        ];
        let loc = Location::parse("p:d");
        let facilities =
            place_facilities(&rows, &loc, 1, 300, &Cache::memory()).unwrap();

        // One representative point: the group centroid, not a raw point.
        assert_eq!(facilities.len(), 1);
        assert!((facilities[0].lon - 1.0).abs() < 1e-9);
        assert!(facilities[0].lat.abs() < 1e-9);
    }

    #[test]
    fn ids_are_sequential_across_groups() {
        let rows = vec![
            row("a", 0, 0.0, 0.0),
            row("a", 0, 0.1, 0.0),
            row("b", 1, 5.0, 5.0),
            row("b", 1, 5.1, 5.0),
        ];
        let loc = Location::parse("p:d");
        let facilities =
            place_facilities(&rows, &loc, 2, 300, &Cache::memory()).unwrap();

        assert_eq!(facilities.len(), 4);
        let ids: Vec<&str> = facilities.iter().map(|f| f.facility_id.as_str()).collect();
        assert_eq!(ids, vec!["p:d_0", "p:d_1", "p:d_2", "p:d_3"]);
    }

    #[test]
    fn facilities_carry_plus_codes() {
        let rows = vec![row("v", 0, -1.5, 12.3)];
        let loc = Location::parse("p:d");
        let facilities =
            place_facilities(&rows, &loc, 1, 300, &Cache::memory()).unwrap();
        assert_eq!(facilities[0].plus, pluscode::encode(12.3, -1.5));
        assert_eq!(facilities[0].plus.len(), 11);
    }

    #[test]
    fn requested_facilities_clamp_to_group_size() {
        let rows = vec![
            row("v", 0, 0.0, 0.0),
            row("v", 0, 1.0, 0.0),
            row("v", 0, 2.0, 0.0),
        ];
        let loc = Location::parse("p:d");
        let facilities =
            place_facilities(&rows, &loc, 10, 300, &Cache::memory()).unwrap();
        assert_eq!(facilities.len(), 3);
    }
}
