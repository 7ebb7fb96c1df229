#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for administrative boundary attribution.
//!
//! Loads admin polygons from GeoJSON, builds an R-tree spatial index,
//! and provides fast point-in-polygon lookups. Used by the household
//! derivation step, village-center preparation and the outline/placement
//! pipeline.

pub mod geojson_io;
pub mod pluscode;

use geo::{BoundingRect, Contains, MultiPolygon};
use rstar::{RTree, RTreeObject, AABB};

/// Spatial layer failure.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// File read/write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GeoJSON parse or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(String),

    /// A boundary feature is missing a required admin property.
    #[error("boundary feature missing property: {0}")]
    MissingProperty(String),
}

/// A boundary polygon stored in the R-tree with its admin path.
#[derive(Debug)]
pub struct BoundaryFeature {
    adm: Vec<String>,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl BoundaryFeature {
    /// Builds a boundary feature, computing its envelope.
    #[must_use]
    pub fn new(adm: Vec<String>, polygon: MultiPolygon<f64>) -> Self {
        let envelope = compute_envelope(&polygon);
        Self {
            adm,
            envelope,
            polygon,
        }
    }

    /// The feature's admin path values.
    #[must_use]
    pub fn adm(&self) -> &[String] {
        &self.adm
    }

    /// The feature's polygon geometry.
    #[must_use]
    pub const fn polygon(&self) -> &MultiPolygon<f64> {
        &self.polygon
    }

    /// True when the feature contains the point.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygon.contains(&geo::Point::new(lon, lat))
    }
}

impl RTreeObject for BoundaryFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over administrative boundary polygons.
///
/// Constructed once per run and shared across all consumers.
pub struct BoundaryIndex {
    tree: RTree<BoundaryFeature>,
}

impl BoundaryIndex {
    /// Builds the index from boundary features.
    #[must_use]
    pub fn new(features: Vec<BoundaryFeature>) -> Self {
        Self {
            tree: RTree::bulk_load(features),
        }
    }

    /// Loads boundary polygons from a GeoJSON file and builds the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or a feature
    /// lacks one of the `adm_cols` properties.
    pub fn load(path: &std::path::Path, adm_cols: &[String]) -> Result<Self, SpatialError> {
        let features = geojson_io::read_boundaries(path, adm_cols)?;
        log::info!(
            "Loaded {} boundary polygons into spatial index from {}",
            features.len(),
            path.display()
        );
        Ok(Self::new(features))
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// True when the index holds no polygons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Iterates over all indexed features.
    pub fn features(&self) -> impl Iterator<Item = &BoundaryFeature> {
        self.tree.iter()
    }

    /// Looks up the boundary containing a point.
    ///
    /// Admin polygons tile the country without overlap, so first match
    /// wins.
    #[must_use]
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<&BoundaryFeature> {
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .find(|entry| entry.polygon.contains(&point))
    }
}

/// Joins point rows to boundary polygons with a `within` predicate.
///
/// Rows with non-finite coordinates are dropped before the join; rows
/// falling outside every polygon are filtered out. Matches are annotated
/// with the containing polygon's admin values.
pub fn join_points<T>(
    rows: Vec<T>,
    coords: impl Fn(&T) -> (f64, f64),
    index: &BoundaryIndex,
) -> Vec<(T, Vec<String>)> {
    rows.into_iter()
        .filter_map(|row| {
            let (lon, lat) = coords(&row);
            if !lon.is_finite() || !lat.is_finite() {
                return None;
            }
            let adm = index.lookup(lon, lat)?.adm().to_vec();
            Some((row, adm))
        })
        .collect()
}

/// Inverse join: retains boundary polygons containing at least one of
/// the given points (`contains` predicate).
pub fn join_polygons<'a>(
    index: &'a BoundaryIndex,
    points: &[(f64, f64)],
) -> Vec<&'a BoundaryFeature> {
    index
        .features()
        .filter(|feature| {
            points
                .iter()
                .any(|&(lon, lat)| lon.is_finite() && lat.is_finite() && feature.contains(lon, lat))
        })
        .collect()
}

/// Computes the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x0: f64, y0: f64, size: f64, adm: &[&str]) -> BoundaryFeature {
        let poly = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ];
        BoundaryFeature::new(
            adm.iter().map(ToString::to_string).collect(),
            MultiPolygon(vec![poly]),
        )
    }

    fn two_square_index() -> BoundaryIndex {
        BoundaryIndex::new(vec![
            square(0.0, 0.0, 1.0, &["p", "d", "west"]),
            square(1.0, 0.0, 1.0, &["p", "d", "east"]),
        ])
    }

    #[test]
    fn lookup_finds_containing_polygon() {
        let index = two_square_index();
        assert_eq!(index.lookup(0.5, 0.5).unwrap().adm()[2], "west");
        assert_eq!(index.lookup(1.5, 0.5).unwrap().adm()[2], "east");
        assert!(index.lookup(5.0, 5.0).is_none());
    }

    #[test]
    fn join_points_filters_and_annotates() {
        let index = two_square_index();
        let rows = vec![(0.5, 0.5), (1.5, 0.5), (9.0, 9.0), (f64::NAN, 0.5)];
        let joined = join_points(rows, |&(lon, lat)| (lon, lat), &index);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].1[2], "west");
        assert_eq!(joined[1].1[2], "east");
    }

    #[test]
    fn join_polygons_keeps_only_occupied() {
        let index = two_square_index();
        let polys = join_polygons(&index, &[(0.5, 0.5), (0.6, 0.6)]);
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].adm()[2], "west");
    }
}
