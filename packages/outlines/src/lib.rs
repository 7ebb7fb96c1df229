#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Cluster outline shapes and result merging.
//!
//! Converts clustered household points into convex-hull polygons per
//! cluster, clipped to the administrative boundary so clusters never
//! extend outside it. Per-location result quintuples are merged into
//! global artifacts with deterministic row ordering.

use std::collections::BTreeMap;
use std::path::Path;

use facility_map_models::tables::{self, TableError, CLUSTER_COL};
use facility_map_models::{
    CenterRow, ClusterCount, ClusterRow, ColumnSpec, Facility, Location, ResultFiles,
};
use facility_map_spatial::geojson_io::{self, ShapeFeature};
use facility_map_spatial::SpatialError;
use geo::{Area, BooleanOps, ConvexHull, LineString, MultiPoint, MultiPolygon, Point, Polygon};

/// Column name carrying per-shape household counts.
pub const HOUSEHOLDS_COL: &str = "households";

/// Half-width in degrees of the square grown around single-point
/// clusters before hulling.
const POINT_BUFFER_DEG: f64 = 0.00001;

/// Outline/merge failure.
#[derive(Debug, thiserror::Error)]
pub enum OutlineError {
    /// Table IO failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Geometry IO failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// File IO failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One cluster's outline with its household count.
pub struct ClusterShape {
    pub adm: Vec<String>,
    pub village: String,
    pub cluster: usize,
    pub households: u64,
    pub geometry: geo::Geometry<f64>,
}

impl ClusterShape {
    /// True when the clipped outline survived as a plain polygon.
    #[must_use]
    pub const fn is_polygon(&self) -> bool {
        matches!(self.geometry, geo::Geometry::Polygon(_))
    }
}

fn point_square(lon: f64, lat: f64) -> Polygon<f64> {
    let d = POINT_BUFFER_DEG;
    Polygon::new(
        LineString::from(vec![
            (lon - d, lat - d),
            (lon + d, lat - d),
            (lon + d, lat + d),
            (lon - d, lat + d),
            (lon - d, lat - d),
        ]),
        vec![],
    )
}

fn group_hull(points: &[(f64, f64)]) -> geo::Geometry<f64> {
    match points {
        [] => geo::Geometry::MultiPolygon(MultiPolygon(vec![])),
        [(lon, lat)] => geo::Geometry::Polygon(point_square(*lon, *lat)),
        [a, b] => {
            // Two points collapse to a segment, excluded at export.
            geo::Geometry::LineString(LineString::from(vec![*a, *b]))
        }
        _ => {
            let multi: MultiPoint<f64> =
                points.iter().map(|&(lon, lat)| Point::new(lon, lat)).collect();
            geo::Geometry::Polygon(multi.convex_hull())
        }
    }
}

fn clip(geometry: geo::Geometry<f64>, boundary: &MultiPolygon<f64>) -> geo::Geometry<f64> {
    let polygon = match geometry {
        geo::Geometry::Polygon(p) => p,
        other => return other,
    };
    if polygon.unsigned_area() == 0.0 {
        // Collinear hull; boolean ops on degenerate rings are undefined.
        return geo::Geometry::Polygon(polygon);
    }

    let mut clipped = MultiPolygon(vec![polygon]).intersection(boundary);
    if clipped.0.len() == 1 {
        geo::Geometry::Polygon(clipped.0.remove(0))
    } else {
        geo::Geometry::MultiPolygon(clipped)
    }
}

/// Builds cluster outlines for one location.
///
/// Groups household points by (admin path, village, cluster), takes the
/// convex hull of each group and clips it to the administrative
/// boundary. Household counts are joined in from the counts table;
/// groups without a counts row default to the group size.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn build_cluster_shapes(
    boundary: &MultiPolygon<f64>,
    clusters: &[ClusterRow],
    counts: &[ClusterCount],
) -> Vec<ClusterShape> {
    let count_by_key: BTreeMap<(&[String], &str, usize), u64> = counts
        .iter()
        .map(|c| ((c.adm.as_slice(), c.village.as_str(), c.cluster), c.counts))
        .collect();

    let mut grouped: BTreeMap<(Vec<String>, String, usize), Vec<(f64, f64)>> = BTreeMap::new();
    for row in clusters {
        grouped
            .entry((row.adm.clone(), row.village.clone(), row.cluster))
            .or_default()
            .push((row.lon, row.lat));
    }

    grouped
        .into_iter()
        .map(|((adm, village, cluster), points)| {
            let households = count_by_key
                .get(&(adm.as_slice(), village.as_str(), cluster))
                .copied()
                .unwrap_or(points.len() as u64);
            let geometry = clip(group_hull(&points), boundary);
            ClusterShape {
                adm,
                village,
                cluster,
                households,
                geometry,
            }
        })
        .collect()
}

fn shape_to_feature(shape: &ClusterShape, cols: &ColumnSpec) -> ShapeFeature {
    let mut properties = serde_json::Map::new();
    for (col, value) in cols.adm_cols.iter().zip(&shape.adm) {
        properties.insert(col.clone(), value.clone().into());
    }
    properties.insert(cols.village_col.clone(), shape.village.clone().into());
    properties.insert(CLUSTER_COL.to_string(), shape.cluster.into());
    properties.insert(HOUSEHOLDS_COL.to_string(), shape.households.into());
    ShapeFeature {
        properties,
        geometry: shape.geometry.clone(),
    }
}

/// Exports cluster shapes to a GeoJSON file.
///
/// Only polygon geometries are written; degenerate clusters that
/// collapsed to segments or split under clipping are excluded by
/// policy. Returns the number of features written.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn export_shapes(
    shapes: &[ClusterShape],
    path: &Path,
    cols: &ColumnSpec,
) -> Result<usize, OutlineError> {
    let features: Vec<ShapeFeature> = shapes
        .iter()
        .filter(|s| s.is_polygon())
        .map(|s| shape_to_feature(s, cols))
        .collect();

    let skipped = shapes.len() - features.len();
    if skipped > 0 {
        log::debug!("Excluded {skipped} degenerate cluster shapes from {}", path.display());
    }

    geojson_io::write_features(path, &features)?;
    Ok(features.len())
}

/// The five merged result tables held in memory before saving.
pub struct ResultData {
    pub shapes: Vec<ShapeFeature>,
    pub clusters: Vec<ClusterRow>,
    pub centers: Vec<CenterRow>,
    pub counts: Vec<ClusterCount>,
    pub facilities: Vec<Facility>,
}

impl ResultData {
    /// Saves the merged tables to the given files.
    ///
    /// # Errors
    ///
    /// Returns an error on IO failure.
    pub fn save(&self, files: &ResultFiles, cols: &ColumnSpec) -> Result<(), OutlineError> {
        geojson_io::write_features(&files.shapes_file, &self.shapes)?;
        tables::write_clusters(&files.clusters_file, &self.clusters, cols)?;
        tables::write_centers(&files.centers_file, &self.centers, cols)?;
        tables::write_counts(&files.counts_file, &self.counts, cols)?;
        tables::write_facilities(&files.facilities_file, &self.facilities, cols)?;
        Ok(())
    }
}

fn feature_sort_key(feature: &ShapeFeature, cols: &ColumnSpec) -> (Vec<String>, u64, u64) {
    let mut adm: Vec<String> = cols
        .adm_cols
        .iter()
        .map(|c| feature.property_str(c).unwrap_or_default().to_string())
        .collect();
    adm.push(
        feature
            .property_str(&cols.village_col)
            .unwrap_or_default()
            .to_string(),
    );
    (
        adm,
        feature.property_u64(CLUSTER_COL).unwrap_or_default(),
        feature.property_u64(HOUSEHOLDS_COL).unwrap_or_default(),
    )
}

/// Merges per-location results into the global artifact set.
///
/// Each of the five artifact kinds is concatenated across locations and
/// sorted by its full column set, so the merged output is a
/// deterministic row-for-row union.
///
/// # Errors
///
/// Returns an error if any per-location artifact cannot be read or the
/// merged files cannot be written.
pub fn merge_results(
    results: &BTreeMap<Location, ResultFiles>,
    merged: &ResultFiles,
    cols: &ColumnSpec,
) -> Result<ResultFiles, OutlineError> {
    let data = merge_result_data(results, cols)?;
    data.save(merged, cols)?;
    Ok(merged.clone())
}

/// Reads and concatenates every location's artifacts, sorting each
/// table by its full column set.
///
/// # Errors
///
/// Returns an error if any per-location artifact cannot be read.
pub fn merge_result_data(
    results: &BTreeMap<Location, ResultFiles>,
    cols: &ColumnSpec,
) -> Result<ResultData, OutlineError> {
    let mut shapes = Vec::new();
    let mut clusters = Vec::new();
    let mut centers = Vec::new();
    let mut counts = Vec::new();
    let mut facilities = Vec::new();

    for files in results.values() {
        shapes.extend(geojson_io::read_features(&files.shapes_file)?);
        clusters.extend(tables::read_clusters(&files.clusters_file, cols)?);
        centers.extend(tables::read_centers(&files.centers_file, cols)?);
        counts.extend(tables::read_counts(&files.counts_file, cols)?);
        facilities.extend(tables::read_facilities(&files.facilities_file, cols)?);
    }

    shapes.sort_by(|a, b| feature_sort_key(a, cols).cmp(&feature_sort_key(b, cols)));
    tables::sort_clusters_merged(&mut clusters);
    tables::sort_centers_merged(&mut centers);
    tables::sort_counts_merged(&mut counts);
    tables::sort_facilities_merged(&mut facilities);

    Ok(ResultData {
        shapes,
        clusters,
        centers,
        counts,
        facilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn spec() -> ColumnSpec {
        ColumnSpec {
            adm_cols: vec!["adm1".into(), "adm2".into()],
            village_col: "village".into(),
            lon_col: "lon".into(),
            lat_col: "lat".into(),
        }
    }

    fn boundary() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]])
    }

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
    fn triangle_cluster_becomes_polygon_with_counts() {
        let rows = vec![
            row("v", 0, 1.0, 1.0),
            row("v", 0, 3.0, 1.0),
            row("v", 0, 2.0, 3.0),
        ];
        let counts = vec![ClusterCount {
            adm: vec!["p".into(), "d".into()],
            village: "v".into(),
            cluster: 0,
            counts: 3,
            small: false,
        }];
        let shapes = build_cluster_shapes(&boundary(), &rows, &counts);
        assert_eq!(shapes.len(), 1);
        assert!(shapes[0].is_polygon());
        assert_eq!(shapes[0].households, 3);
    }

    #[test]
    fn hull_is_clipped_to_boundary() {
        // A triangle partly outside the 10x10 boundary.
        let rows = vec![
            row("v", 0, 5.0, 5.0),
            row("v", 0, 15.0, 5.0),
            row("v", 0, 5.0, 9.0),
        ];
        let shapes = build_cluster_shapes(&boundary(), &rows, &[]);
        assert_eq!(shapes.len(), 1);
        let geo::Geometry::Polygon(poly) = &shapes[0].geometry else {
            panic!("expected polygon");
        };
        use geo::BoundingRect;
        let rect = poly.bounding_rect().unwrap();
        assert!(rect.max().x <= 10.0 + 1e-9);
    }

    #[test]
    fn degenerate_clusters_are_excluded_at_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapes.geojson");

        let rows = vec![
            // Two-point cluster collapses to a segment.
            row("v1", 0, 1.0, 1.0),
            row("v1", 0, 2.0, 2.0),
            // One-point cluster grows into a small square.
            row("v2", 1, 5.0, 5.0),
        ];
        let shapes = build_cluster_shapes(&boundary(), &rows, &[]);
        assert_eq!(shapes.len(), 2);

        let written = export_shapes(&shapes, &path, &spec()).unwrap();
        assert_eq!(written, 1);

        let features = geojson_io::read_features(&path).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].property_str("village"), Some("v2"));
    }

    #[test]
    fn merge_is_a_sorted_union() {
        let dir = tempfile::tempdir().unwrap();
        let cols = spec();

        let mut results = BTreeMap::new();
        for (name, lon) in [("east", 5.0), ("west", 1.0)] {
            let base = dir.path().join(name);
            let files = ResultFiles {
                shapes_file: base.join("shapes.geojson"),
                clusters_file: base.join("clusters.csv"),
                centers_file: base.join("centers.csv"),
                counts_file: base.join("counts.csv"),
                facilities_file: base.join("facilities.csv"),
            };

            let rows = vec![
                row(name, 0, lon, 1.0),
                row(name, 0, lon + 1.0, 1.0),
                row(name, 0, lon + 0.5, 2.0),
            ];
            let counts = vec![ClusterCount {
                adm: vec!["p".into(), "d".into()],
                village: name.into(),
                cluster: 0,
                counts: 3,
                small: false,
            }];
            let shapes = build_cluster_shapes(&boundary(), &rows, &counts);
            export_shapes(&shapes, &files.shapes_file, &cols).unwrap();
            tables::write_clusters(&files.clusters_file, &rows, &cols).unwrap();
            tables::write_centers(&files.centers_file, &[], &cols).unwrap();
            tables::write_counts(&files.counts_file, &counts, &cols).unwrap();
            tables::write_facilities(&files.facilities_file, &[], &cols).unwrap();

            results.insert(Location::parse(&format!("p:d:{name}")), files);
        }

        let data = merge_result_data(&results, &cols).unwrap();
        assert_eq!(data.clusters.len(), 6);
        assert_eq!(data.counts.len(), 2);
        assert_eq!(data.shapes.len(), 2);

        // Row-for-row union, sorted by the full column order.
        assert_eq!(data.counts[0].village, "east");
        assert_eq!(data.counts[1].village, "west");
        let mut resorted = data.clusters.clone();
        tables::sort_clusters_merged(&mut resorted);
        assert_eq!(resorted, data.clusters);
    }
}
