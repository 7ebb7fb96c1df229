//! GeoJSON reading and writing for boundary and result geometries.
//!
//! Boundary files are FeatureCollections whose features carry the admin
//! path as string properties. Result shapes are written the same way,
//! with cluster and household-count properties alongside.

use std::fs;
use std::path::Path;

use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson};

use crate::{BoundaryFeature, SpatialError};

/// A geometry feature with free-form properties, the unit of GeoJSON IO.
pub struct ShapeFeature {
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub geometry: geo::Geometry<f64>,
}

impl ShapeFeature {
    /// Fetches a string property.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    /// Fetches an integer property.
    #[must_use]
    pub fn property_u64(&self, key: &str) -> Option<u64> {
        self.properties.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// Reads admin boundary polygons from a GeoJSON file.
///
/// Handles `Polygon` and `MultiPolygon` feature geometries; other
/// geometry types are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a polygon
/// feature lacks one of the `adm_cols` properties.
pub fn read_boundaries(
    path: &Path,
    adm_cols: &[String],
) -> Result<Vec<BoundaryFeature>, SpatialError> {
    let features = read_features(path)?;
    let mut boundaries = Vec::with_capacity(features.len());

    for feature in features {
        let polygon = match feature.geometry {
            geo::Geometry::MultiPolygon(mp) => mp,
            geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
            _ => {
                log::warn!("Skipping non-polygon boundary feature in {}", path.display());
                continue;
            }
        };

        let adm = adm_cols
            .iter()
            .map(|col| {
                feature
                    .properties
                    .get(col)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| SpatialError::MissingProperty(col.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        boundaries.push(BoundaryFeature::new(adm, polygon));
    }

    Ok(boundaries)
}

/// Reads a GeoJSON FeatureCollection into [`ShapeFeature`]s.
///
/// Features without a geometry are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_features(path: &Path) -> Result<Vec<ShapeFeature>, SpatialError> {
    let text = fs::read_to_string(path)?;
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| SpatialError::GeoJson(e.to_string()))?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(SpatialError::GeoJson(format!(
            "expected a FeatureCollection in {}",
            path.display()
        )));
    };

    let mut features = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: geo::Geometry<f64> = geometry
            .try_into()
            .map_err(|e: geojson::Error| SpatialError::GeoJson(e.to_string()))?;
        features.push(ShapeFeature {
            properties: feature.properties.unwrap_or_default(),
            geometry,
        });
    }
    Ok(features)
}

/// Writes [`ShapeFeature`]s as a GeoJSON FeatureCollection.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_features(path: &Path, features: &[ShapeFeature]) -> Result<(), SpatialError> {
    let collection = FeatureCollection {
        bbox: None,
        features: features
            .iter()
            .map(|f| Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
                id: None,
                properties: Some(f.properties.clone()),
                foreign_members: None,
            })
            .collect(),
        foreign_members: None,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, GeoJson::from(collection).to_string())?;
    Ok(())
}
