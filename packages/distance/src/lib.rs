#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Distance computation between households/centroids and facilities.
//!
//! Coordinates are projected from geodetic degrees to Earth-centered
//! Cartesian meters before measuring, so distances are meters rather
//! than distorted degree deltas. Facility assignment uses plain
//! Euclidean distance; the reported travel distance uses a Minkowski
//! metric with p = 1.54, a tuned approximation of real travel distance
//! versus the straight line.

use facility_map_models::{CenterRow, ClusterRow, Facility, FacilityDistance};

/// Spherical Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Minkowski exponent approximating travel distance.
pub const MINKOWSKI_P: f64 = 1.54;

/// Converts geodetic degrees (plus elevation in meters) to
/// Earth-centered Cartesian meters on a spherical Earth model.
#[must_use]
pub fn lon_lat_to_cartesian(lon: f64, lat: f64, elevation: f64) -> [f64; 3] {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let r = EARTH_RADIUS_M + elevation;

    [
        r * lat_rad.cos() * lon_rad.cos(),
        r * lat_rad.cos() * lon_rad.sin(),
        r * lat_rad.sin(),
    ]
}

/// Euclidean distance between two Cartesian points.
#[must_use]
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Minkowski distance with exponent `p` between two Cartesian points.
#[must_use]
pub fn minkowski_distance(a: &[f64; 3], b: &[f64; 3], p: f64) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs().powf(p))
        .sum::<f64>()
        .powf(1.0 / p)
}

/// For each point, finds the index of its closest facility and the
/// Euclidean distance to it, over the full pairwise distance matrix.
///
/// Ties break toward the first minimum, so the facility list's input
/// order is significant.
#[must_use]
pub fn nearest_facility(points: &[[f64; 3]], facilities: &[[f64; 3]]) -> (Vec<usize>, Vec<f64>) {
    let mut indices = Vec::with_capacity(points.len());
    let mut distances = Vec::with_capacity(points.len());

    for point in points {
        let mut best_idx = 0;
        let mut best_dist = f64::INFINITY;
        for (idx, facility) in facilities.iter().enumerate() {
            let dist = euclidean_distance(point, facility);
            if dist < best_dist {
                best_dist = dist;
                best_idx = idx;
            }
        }
        indices.push(best_idx);
        distances.push(best_dist);
    }

    (indices, distances)
}

/// Assigns every point to its nearest facility by Cartesian Euclidean
/// distance, then measures the Minkowski (p = 1.54) distance between the
/// assigned pairs.
///
/// Returns `None` when either input set is empty: the caller passes the
/// unmodified rows through, which is deliberate degenerate-case policy,
/// not an error.
#[must_use]
pub fn assign_and_measure(
    points: &[(f64, f64)],
    facilities: &[Facility],
) -> Option<Vec<FacilityDistance>> {
    if points.is_empty() || facilities.is_empty() {
        return None;
    }

    let point_xyz: Vec<[f64; 3]> = points
        .iter()
        .map(|&(lon, lat)| lon_lat_to_cartesian(lon, lat, 0.0))
        .collect();
    let facility_xyz: Vec<[f64; 3]> = facilities
        .iter()
        .map(|f| lon_lat_to_cartesian(f.lon, f.lat, 0.0))
        .collect();

    let (indices, distances) = nearest_facility(&point_xyz, &facility_xyz);

    Some(
        indices
            .iter()
            .zip(&distances)
            .zip(&point_xyz)
            .map(|((&idx, &euclidean), point)| FacilityDistance {
                assigned_id: facilities[idx].facility_id.clone(),
                euclidean,
                minkowski: minkowski_distance(point, &facility_xyz[idx], MINKOWSKI_P),
            })
            .collect(),
    )
}

/// Enriches a location's cluster rows (`hh` columns) and center rows
/// (`village` columns) with distances to the optimal facilities, and,
/// when a baseline set is supplied, with `baseline_*` distances as well.
///
/// Empty inputs skip the corresponding enrichment with a warning
/// (passthrough, not failure). Center rows measure from the computed
/// cluster centroid, not the original village center point.
pub fn enrich_distances(
    clusters: &mut [ClusterRow],
    centers: &mut [CenterRow],
    facilities: &[Facility],
    baseline: Option<&[Facility]>,
) {
    let cluster_points: Vec<(f64, f64)> = clusters.iter().map(|r| (r.lon, r.lat)).collect();
    let center_points: Vec<(f64, f64)> = centers
        .iter()
        .map(|r| (r.centroid_lon, r.centroid_lat))
        .collect();

    match assign_and_measure(&cluster_points, facilities) {
        Some(measured) => {
            for (row, d) in clusters.iter_mut().zip(measured) {
                row.optimal = Some(d);
            }
        }
        None => log::warn!("No data for distance computation, skipped for optimal households"),
    }

    match assign_and_measure(&center_points, facilities) {
        Some(measured) => {
            for (row, d) in centers.iter_mut().zip(measured) {
                row.optimal = Some(d);
            }
        }
        None => log::warn!("No data for distance computation, skipped for optimal centroids"),
    }

    if let Some(baseline) = baseline {
        match assign_and_measure(&cluster_points, baseline) {
            Some(measured) => {
                for (row, d) in clusters.iter_mut().zip(measured) {
                    row.baseline = Some(d);
                }
            }
            None => log::warn!("No baseline facilities within boundary, skipped for households"),
        }
        match assign_and_measure(&center_points, baseline) {
            Some(measured) => {
                for (row, d) in centers.iter_mut().zip(measured) {
                    row.baseline = Some(d);
                }
            }
            None => log::warn!("No baseline facilities within boundary, skipped for centroids"),
        }
    }
}

/// An (x, y) pair of a sorted distance in kilometers and its cumulative
/// percentage, the empirical CDF consumed by the coverage plots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcdfPoint {
    pub distance_km: f64,
    pub cumulative_perc: f64,
}

/// Computes the empirical CDF of a distance column, scaled to
/// kilometers. Non-finite values are skipped. Returns an empty vector
/// for empty input.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ecdf_km(distances_m: impl IntoIterator<Item = f64>) -> Vec<EcdfPoint> {
    let mut km: Vec<f64> = distances_m
        .into_iter()
        .filter(|d| d.is_finite())
        .map(|d| d * 1e-3)
        .collect();
    km.sort_by(f64::total_cmp);

    let n = km.len();
    km.into_iter()
        .enumerate()
        .map(|(i, distance_km)| EcdfPoint {
            distance_km,
            cumulative_perc: (i + 1) as f64 / n as f64 * 100.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, rel: f64) -> bool {
        (a - b).abs() <= rel * b.abs().max(1.0)
    }

    #[test]
    fn cartesian_reference_points() {
        let origin = lon_lat_to_cartesian(0.0, 0.0, 0.0);
        assert!(close(origin[0], 6_378_137.0, 1e-9));
        assert!(origin[1].abs() < 1e-6);
        assert!(origin[2].abs() < 1e-6);

        let east = lon_lat_to_cartesian(90.0, 0.0, 500.0);
        assert!(east[0].abs() < 1e-6);
        assert!(close(east[1], 6_378_637.0, 1e-9));
        assert!(east[2].abs() < 1e-6);
    }

    #[test]
    fn nearest_facility_fixture() {
        let points = [
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [2.0, 2.0, 0.0],
        ];
        let facilities = [
            [1.0, 1.0, 0.0],
            [2.0, 2.0, 0.0],
            [3.0, 3.0, 0.0],
        ];
        let (indices, distances) = nearest_facility(&points, &facilities);
        assert_eq!(indices, vec![0, 0, 1]);
        assert!(close(distances[0], 2.0_f64.sqrt(), 1e-12));
        assert!(distances[1].abs() < 1e-12);
        assert!(distances[2].abs() < 1e-12);
    }

    #[test]
    fn minkowski_unit_cube_constant() {
        let d = minkowski_distance(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], MINKOWSKI_P);
        assert!(close(d, 2.040_887_175_012_965_6, 1e-9));
    }

    #[test]
    fn assign_and_measure_empty_is_passthrough() {
        let facility = Facility {
            adm: vec!["a".into()],
            village: "v".into(),
            lon: 0.0,
            lat: 0.0,
            plus: String::new(),
            facility_id: "a_0".into(),
        };
        assert!(assign_and_measure(&[], &[facility]).is_none());
        assert!(assign_and_measure(&[(0.0, 0.0)], &[]).is_none());
    }

    #[test]
    fn assign_and_measure_picks_nearest_id() {
        let facilities = vec![
            Facility {
                adm: vec!["a".into()],
                village: "v".into(),
                lon: 0.0,
                lat: 0.0,
                plus: String::new(),
                facility_id: "a_0".into(),
            },
            Facility {
                adm: vec!["a".into()],
                village: "v".into(),
                lon: 1.0,
                lat: 1.0,
                plus: String::new(),
                facility_id: "a_1".into(),
            },
        ];
        let measured = assign_and_measure(&[(0.9, 0.9), (0.1, 0.0)], &facilities).unwrap();
        assert_eq!(measured[0].assigned_id, "a_1");
        assert_eq!(measured[1].assigned_id, "a_0");
        assert!(measured[0].euclidean > 0.0);
        assert!(measured[0].minkowski >= measured[0].euclidean);
    }

    #[test]
    fn ecdf_is_sorted_and_scaled() {
        let points = ecdf_km(vec![3000.0, 1000.0, 2000.0, f64::NAN]);
        assert_eq!(points.len(), 3);
        assert!(close(points[0].distance_km, 1.0, 1e-12));
        assert!(close(points[2].distance_km, 3.0, 1e-12));
        assert!(close(points[0].cumulative_perc, 100.0 / 3.0, 1e-12));
        assert!(close(points[2].cumulative_perc, 100.0, 1e-12));
    }
}
